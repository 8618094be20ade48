use crate::sitemap::SitemapError;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;

/// Depth of `<loc>` inside `<urlset><url>` and `<sitemapindex><sitemap>`
const LOC_DEPTH: usize = 3;

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),

    /// `<urlset>`: locations of pages
    UrlSet(Vec<String>),
}

/// Unwraps a gzip-compressed sitemap file, leaving other bodies untouched
///
/// Transport-level `Content-Encoding` is already handled by the HTTP client;
/// this covers `.xml.gz` files served as `application/x-gzip`.
pub fn decode_body(body: Vec<u8>, max_bytes: usize) -> Result<Vec<u8>, SitemapError> {
    if !body.starts_with(&[0x1f, 0x8b]) {
        return Ok(body);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(body.as_slice())
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut decoded)?;

    if decoded.len() > max_bytes {
        return Err(SitemapError::TooLarge(max_bytes));
    }

    Ok(decoded)
}

/// Parses a sitemap or sitemap index
///
/// The root element decides the document kind. Only `<loc>` elements that
/// are direct children of `<url>` or `<sitemap>` are collected, so extension
/// tags like `<image:loc>` are ignored. The declared XML encoding is honored.
pub fn parse_sitemap(xml: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut is_index: Option<bool> = None;
    let mut depth = 0usize;
    let mut in_loc = false;
    let mut text = String::new();
    let mut locations = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = e.local_name();

                if is_index.is_none() {
                    is_index = match name.as_ref() {
                        b"sitemapindex" => Some(true),
                        b"urlset" => Some(false),
                        other => {
                            return Err(SitemapError::NotSitemap(format!(
                                "unexpected root element <{}>",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    };
                } else if depth == LOC_DEPTH && name.as_ref() == b"loc" {
                    in_loc = true;
                    text.clear();
                }
            }
            Event::Text(e) if in_loc => {
                text.push_str(&e.unescape()?);
            }
            Event::CData(e) if in_loc => {
                text.push_str(&reader.decoder().decode(&e)?);
            }
            Event::End(_) => {
                if in_loc && depth == LOC_DEPTH {
                    let location = text.trim();
                    if !location.is_empty() {
                        locations.push(location.to_string());
                    }
                    in_loc = false;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(e) if is_index.is_none() => {
                // `<urlset/>` is a valid, empty sitemap
                return match e.local_name().as_ref() {
                    b"sitemapindex" => Ok(SitemapDocument::Index(Vec::new())),
                    b"urlset" => Ok(SitemapDocument::UrlSet(Vec::new())),
                    other => Err(SitemapError::NotSitemap(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(other)
                    ))),
                };
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match is_index {
        Some(true) => Ok(SitemapDocument::Index(locations)),
        Some(false) => Ok(SitemapDocument::UrlSet(locations)),
        None => Err(SitemapError::NotSitemap("empty document".to_string())),
    }
}
