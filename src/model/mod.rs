//! Authorization objects replicated through the pooler.
mod policy;
mod role;

pub use policy::*;
pub use role::*;


/// Trims, drops blanks, sorts and deduplicates
fn normalize_list(values: &mut Vec<String>) {
    for value in values.iter_mut() {
        *value = value.trim().to_string();
    }
    values.retain(|value| !value.is_empty());
    values.sort();
    values.dedup();
}
