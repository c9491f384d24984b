/// Whether an asset called `name` passes the optional substring filter.
///
/// The check is case-sensitive. A missing or empty filter accepts everything.
pub fn matches(name: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(filter) if !filter.is_empty() => name.contains(filter),
        _ => true,
    }
}
