pub mod str_utils;

/// Splits a comma-separated filter into its trimmed, non-empty items.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

#[test]
fn test_split_list() {
    assert_eq!(split_list("trip, beach ,,"), vec!["trip", "beach"]);
    assert!(split_list(" , ").is_empty());
}
