//! `sitemap.xml` rendering.

use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    /// Path relative to the public base URL, starting with `/`.
    pub path: String,
    pub last_modified: Option<NaiveDate>,
}

impl SitemapEntry {
    pub fn new(path: impl Into<String>, last_modified: Option<NaiveDate>) -> Self {
        Self { path: path.into(), last_modified }
    }
}

/// Renders a `urlset` document. Text content is escaped by the writer.
pub fn render(base_url: &str, entries: &[SitemapEntry]) -> Result<String, quick_xml::Error> {
    let base = base_url.trim_end_matches('/');
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", SITEMAP_NS));
    writer.write_event(Event::Start(urlset))?;
    for entry in entries {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        text_element(&mut writer, "loc", &format!("{base}{}", entry.path))?;
        if let Some(date) = entry.last_modified {
            text_element(&mut writer, "lastmod", &date.format("%Y-%m-%d").to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("urlset")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
