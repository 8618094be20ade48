use url::Url;

/// File extensions of binary assets the crawler never fetches as pages
const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "bmp", "tif", "tiff", "mp3", "mp4",
    "avi", "mov", "wmv", "webm", "ogg", "wav", "flac", "zip", "gz", "tgz", "rar", "7z", "tar",
    "exe", "dmg", "msi", "iso", "bin", "woff", "woff2", "ttf", "otf", "eot", "css", "js",
    "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

/// Returns true if the URL path ends in a binary asset extension
///
/// # Examples
///
/// ```
/// use url::Url;
/// use nova_crawler::url::is_binary_asset;
///
/// assert!(is_binary_asset(&Url::parse("https://example.com/report.PDF").unwrap()));
/// assert!(!is_binary_asset(&Url::parse("https://example.com/report.html").unwrap()));
/// ```
pub fn is_binary_asset(url: &Url) -> bool {
    let last_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    match last_segment.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Returns true if the URL looks like a sitemap document rather than a page
pub fn is_sitemap_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".xml") || path.ends_with(".xml.gz") || path.contains("sitemap")
}

/// Counts the non-empty segments of the URL path
///
/// `/news/2024/05/story` has four segments, `/` has none.
pub fn path_segment_count(url: &Url) -> usize {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0)
}
