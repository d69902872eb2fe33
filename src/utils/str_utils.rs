pub trait StringExtensions {
    /// Inserts `suffix` before the file extension.
    /// E.g. `"x.jpg".with_name_suffix("_1") == "x_1.jpg"`
    fn with_name_suffix(&self, suffix: &str) -> String;

    /// Case-insensitive `ends_with`.
    fn ends_with_ignore_case(&self, suffix: &str) -> bool;
}

impl StringExtensions for str {
    fn with_name_suffix(&self, suffix: &str) -> String {
        match self.rfind('.') {
            Some(dot) if dot > 0 => format!("{}{}{}", &self[..dot], suffix, &self[dot..]),
            _ => format!("{}{}", self, suffix),
        }
    }

    fn ends_with_ignore_case(&self, suffix: &str) -> bool {
        self.to_lowercase().ends_with(&suffix.to_lowercase())
    }
}

#[test]
fn test_with_name_suffix() {
    assert_eq!("x.jpg".with_name_suffix("_1"), "x_1.jpg");
    assert_eq!("archive.tar.gz".with_name_suffix("_1"), "archive.tar_1.gz");
    assert_eq!("README".with_name_suffix("_1"), "README_1");
    assert_eq!(".hidden".with_name_suffix("_1"), ".hidden_1");
}

#[test]
fn test_ends_with_ignore_case() {
    assert!("IMG_001.JPG".ends_with_ignore_case(".jpg"));
    assert!("clip.mp4".ends_with_ignore_case("MP4"));
    assert!(!"photo.jpeg".ends_with_ignore_case("jpg"));
}
