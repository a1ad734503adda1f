pub mod global_variables;
pub mod vector_collect;
