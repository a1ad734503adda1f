use geo::Intersects;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::commons::basic_functions::{count_unique, EnvelopeIndex, GeometryKey};
use crate::geo_core::Crs;
use crate::geometric::corridor::CombinedBuffer;
use crate::geometric::layer::{Feature, VectorLayer};

/// One row of the lake/buffer spatial join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedLake {
    /// Row index in the lakes layer
    pub lake_index: usize,
    /// Index of the combined buffer piece the lake intersects (`index_right`)
    pub buffer_index: usize,
    pub feature: Feature,
}

/// Counts produced by the accessibility filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccessibilityReport {
    /// Distinct lake geometries in the source layer
    pub total_lakes: usize,
    /// Distinct lake geometries intersecting the combined buffer
    pub accessible_lakes: usize,
    /// Raw join rows, a lake appears once per buffer piece it touches
    pub joined_rows: usize,
    pub buffer_distance: f64,
    pub combined_buffer_pieces: usize,
}

/// Water structure
/// Finds the lakes reachable from the road and trail network
pub struct Water {
    buffer_distance: f64,
    rows: Vec<JoinedLake>,
    report: Option<AccessibilityReport>,
    crs: Option<Crs>,
}

impl Water {
    /// `buffer_distance` is only carried into the report
    pub fn new(buffer_distance: f64) -> Self {
        Water {
            buffer_distance,
            rows: Vec::new(),
            report: None,
            crs: None,
        }
    }

    /// Inner join of `lakes` with `combined` on the intersects predicate
    pub fn run(mut self, lakes: &VectorLayer, combined: &CombinedBuffer) -> Self {
        self.run_internal(lakes, combined);
        self
    }

    /// Fill the join rows and the report in place
    pub fn run_internal(&mut self, lakes: &VectorLayer, combined: &CombinedBuffer) {
        let pieces = combined.layer();
        let index = EnvelopeIndex::new(pieces.geometries());

        let mut rows = Vec::new();
        for (lake_index, lake) in lakes.iter().enumerate() {
            for buffer_index in index.candidates(&lake.geometry) {
                if lake.geometry.intersects(&pieces.features[buffer_index].geometry) {
                    rows.push(JoinedLake {
                        lake_index,
                        buffer_index,
                        feature: lake.clone(),
                    });
                }
            }
        }

        let report = AccessibilityReport {
            total_lakes: count_unique(lakes.geometries()),
            accessible_lakes: count_unique(rows.iter().map(|r| &r.feature.geometry)),
            joined_rows: rows.len(),
            buffer_distance: self.buffer_distance,
            combined_buffer_pieces: pieces.len(),
        };
        info!(
            total = report.total_lakes,
            accessible = report.accessible_lakes,
            rows = report.joined_rows,
            "lake accessibility computed"
        );

        self.crs = lakes.crs.clone();
        self.rows = rows;
        self.report = Some(report);
    }

    /// Join rows ordered by lake index, then buffer piece index
    pub fn get_rows(&self) -> &[JoinedLake] {
        &self.rows
    }

    /// Get lake counts (None before `run`)
    pub fn get_report(&self) -> Option<&AccessibilityReport> {
        self.report.as_ref()
    }

    /// Accessible lakes, one feature per distinct geometry
    pub fn accessible_layer(&self) -> VectorLayer {
        let mut seen = HashSet::new();
        let features = self
            .rows
            .iter()
            .filter(|row| seen.insert(GeometryKey::new(&row.feature.geometry)))
            .map(|row| row.feature.clone())
            .collect();
        VectorLayer::with_features("accessible_lakes", self.crs.clone(), features)
    }
}
