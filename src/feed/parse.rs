// src/feed/parse.rs
//! Atom / RSS document parsing into [`FeedEntry`] values.
//!
//! Shape detection sniffs the root element: anything whose local name contains
//! `feed` is treated as Atom, everything else as RSS (including RDF-style
//! documents where `<item>` sits directly under the root).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Iso8601, Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::FeedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Atom,
    Rss,
}

/// Element text, ignoring attributes such as `type="html"`.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// First non-empty occurrence; repeated children are tolerated, not rejected.
fn text(t: &[Text]) -> &str {
    t.iter()
        .map(|t| t.value.trim())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: Vec<Text>,
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    updated: Vec<Text>,
    #[serde(default)]
    published: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    summary: Vec<Text>,
    #[serde(default)]
    content: Vec<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    fn best_link(&self) -> &str {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .map(|l| l.href.as_str())
            .unwrap_or_default()
    }
}

// --- RSS / RDF ---

#[derive(Debug, Deserialize)]
struct RssDoc {
    channel: Option<RssChannel>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    guid: Vec<Text>,
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    #[serde(rename = "pubDate", default)]
    pub_date: Vec<Text>,
    #[serde(rename = "dc:date", default)]
    dc_date: Vec<Text>,
    #[serde(default)]
    date: Vec<Text>,
    #[serde(default)]
    description: Vec<Text>,
}

/// Local name of the first element in the document, lowercased.
pub fn sniff_root(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                return Some(name);
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

pub fn detect_kind(xml: &str) -> FeedKind {
    match sniff_root(xml) {
        Some(root) if root.contains("feed") => FeedKind::Atom,
        _ => FeedKind::Rss,
    }
}

/// Parse a feed document. `now` is the fallback for unparsable timestamps.
pub fn parse_document(xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    match detect_kind(&xml_clean) {
        FeedKind::Atom => parse_atom(&xml_clean, now),
        FeedKind::Rss => parse_rss(&xml_clean, now),
    }
}

fn parse_atom(xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
    let feed: AtomFeed = from_str(xml).context("parsing atom xml")?;
    let xhtml = atom_xhtml_bodies(xml);
    let out = feed
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let updated = match text(&e.updated) {
                "" => text(&e.published),
                u => u,
            };
            let body = match (text(&e.summary), text(&e.content)) {
                ("", "") => xhtml.get(i).map(String::as_str).unwrap_or_default(),
                ("", c) => c,
                (s, _) => s,
            };
            FeedEntry::new(
                Some(text(&e.id)),
                text(&e.title),
                body,
                updated,
                e.best_link(),
                now,
            )
        })
        .collect();
    Ok(out)
}

/// Text of the first `type="xhtml"` summary or content block of each entry, in
/// document order. Serde only sees the direct text of those elements, which is
/// empty because the markup sits inside a wrapping `<div>`.
fn atom_xhtml_bodies(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut out: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut capture = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth > 0 {
                    depth += 1;
                    continue;
                }
                match e.local_name().as_ref() {
                    b"entry" => out.push(String::new()),
                    b"summary" | b"content" if !out.is_empty() && is_xhtml(&e) => {
                        depth = 1;
                        capture = out.last().is_some_and(|b| b.is_empty());
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) if depth > 0 => depth -= 1,
            Ok(Event::Text(t)) if depth > 0 && capture => {
                if let (Some(body), Ok(chunk)) = (out.last_mut(), t.unescape()) {
                    let chunk = chunk.trim();
                    if !chunk.is_empty() {
                        if !body.is_empty() {
                            body.push(' ');
                        }
                        body.push_str(chunk);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

fn is_xhtml(e: &quick_xml::events::BytesStart<'_>) -> bool {
    matches!(e.try_get_attribute("type"), Ok(Some(a)) if a.value.as_ref() == b"xhtml")
}

fn parse_rss(xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
    let doc: RssDoc = from_str(xml).context("parsing rss xml")?;
    let items = doc
        .channel
        .map(|c| c.items)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.items);
    let out = items
        .map(|it| {
            let pub_raw = [&it.pub_date, &it.dc_date, &it.date]
                .into_iter()
                .map(|v| text(v))
                .find(|s| !s.is_empty())
                .unwrap_or_default();
            FeedEntry::new(
                Some(text(&it.guid)),
                text(&it.title),
                text(&it.description),
                pub_raw,
                text(&it.link),
                now,
            )
        })
        .collect();
    Ok(out)
}

/// Accepts RFC 2822 (`Sat, 06 Sep 2025 08:00:00 GMT`) and ISO 8601 / RFC 3339
/// (`2025-09-06T08:00:00Z`). Returns `None` when nothing matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let from_time = |odt: OffsetDateTime| DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond());

    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        return from_time(odt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc3339) {
        return from_time(odt);
    }
    if let Ok(odt) = OffsetDateTime::parse(s, &Iso8601::DEFAULT) {
        return from_time(odt);
    }
    // Offset-less ISO timestamps are taken as UTC; a bare date means midnight.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sniffs_root_past_declaration_and_comments() {
        let atom = r#"<?xml version="1.0"?><!-- c --><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        assert_eq!(detect_kind(atom), FeedKind::Atom);
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert_eq!(detect_kind(rss), FeedKind::Rss);
        assert_eq!(detect_kind("not xml at all"), FeedKind::Rss);
    }

    #[test]
    fn timestamps_accept_rfc2822_and_iso8601() {
        let want = Utc.with_ymd_and_hms(2025, 9, 6, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("Sat, 06 Sep 2025 08:00:00 GMT"), Some(want));
        assert_eq!(parse_timestamp("Sat, 06 Sep 2025 10:00:00 +0200"), Some(want));
        assert_eq!(parse_timestamp("2025-09-06T08:00:00Z"), Some(want));
        assert_eq!(parse_timestamp("2025-09-06T11:00:00+03:00"), Some(want));
        assert_eq!(parse_timestamp("2025-09-06T08:00:00"), Some(want));
        assert_eq!(
            parse_timestamp("2025-09-06"),
            Some(Utc.with_ymd_and_hms(2025, 9, 6, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("soon"), None);
    }

    #[test]
    fn rss_items_with_dc_date_and_no_guid() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let xml = r#"<rss><channel><title>x</title>
            <item><title>Outage</title><dc:date>2025-09-06T08:00:00Z</dc:date>
            <description>&lt;p&gt;Investigating&lt;/p&gt;</description></item>
            </channel></rss>"#;
        let items = parse_document(xml, now).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "Outage|2025-09-06T08:00:00Z");
        assert_eq!(items[0].body, "Investigating");
        assert_eq!(
            items[0].published,
            Utc.with_ymd_and_hms(2025, 9, 6, 8, 0, 0).unwrap()
        );
    }
}
