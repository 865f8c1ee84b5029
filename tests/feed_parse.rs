// tests/feed_parse.rs
//
// Fixture-driven parsing + classification checks for both feed shapes.

use chrono::{TimeZone, Utc};
use status_monitor::feed::parse::{detect_kind, parse_document, FeedKind};
use status_monitor::feed::Category;

const ATOM: &str = include_str!("fixtures/atom.xml");
const RSS: &str = include_str!("fixtures/rss.xml");

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
}

#[test]
fn atom_fixture_parses_ids_links_and_categories() {
    assert_eq!(detect_kind(ATOM), FeedKind::Atom);
    let entries = parse_document(ATOM, now()).expect("atom parses");
    assert_eq!(entries.len(), 4);

    let first = &entries[0];
    assert_eq!(first.id, "tag:status.example.com,2005:Incident/3");
    assert_eq!(first.title, "Elevated error rates in Chat");
    assert_eq!(first.link, "https://status.example.com/incidents/3");
    assert_eq!(first.category, Category::Incident);
    assert!(!first.analytics);
    assert_eq!(
        first.published,
        Utc.with_ymd_and_hms(2025, 9, 6, 8, 30, 0).unwrap()
    );
    assert!(first.body.contains("Investigating - We are investigating elevated errors."));
    assert!(!first.body.contains('<'));

    let cats: Vec<Category> = entries.iter().map(|e| e.category).collect();
    assert_eq!(
        cats,
        vec![
            Category::Incident,
            Category::Incident,
            Category::Resolved,
            Category::Update
        ]
    );
    assert!(entries[1].analytics);
}

#[test]
fn rss_fixture_falls_back_to_composite_id_without_guid() {
    assert_eq!(detect_kind(RSS), FeedKind::Rss);
    let entries = parse_document(RSS, now()).expect("rss parses");
    assert_eq!(entries.len(), 3);

    assert_eq!(entries[0].id, "inc-101");
    assert_eq!(entries[0].category, Category::Incident);
    assert_eq!(entries[0].body, "Requests are failing for some users.");

    assert_eq!(
        entries[1].id,
        "Composer recovering|Sat, 06 Sep 2025 09:00:00 +0000"
    );
    assert_eq!(entries[1].category, Category::Update);
    assert_eq!(
        entries[1].published,
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    );

    assert_eq!(entries[2].category, Category::Monitoring);
}

#[test]
fn reparsing_yields_identical_ids() {
    let a: Vec<String> = parse_document(RSS, now()).unwrap().into_iter().map(|e| e.id).collect();
    let later = now() + chrono::Duration::hours(3);
    let b: Vec<String> = parse_document(RSS, later).unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(a, b);
}

#[test]
fn bad_date_does_not_fail_the_document() {
    let xml = r#"<rss><channel>
        <item><guid>a</guid><title>Outage</title><pubDate>someday</pubDate></item>
        <item><guid>b</guid><title>Outage</title><pubDate>Sat, 06 Sep 2025 08:00:00 GMT</pubDate></item>
        </channel></rss>"#;
    let entries = parse_document(xml, now()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].published, now());
    assert_eq!(entries[0].published_raw, "someday");
}

#[test]
fn html_entities_that_break_xml_are_tolerated() {
    let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
        <id>x</id><title>Chat&nbsp;degraded &mdash; investigating</title>
        <updated>2025-09-06T08:00:00Z</updated></entry></feed>"#;
    let entries = parse_document(xml, now()).unwrap();
    assert_eq!(entries[0].title, "Chat degraded - investigating");
    assert_eq!(entries[0].category, Category::Incident);
}

#[test]
fn empty_channel_is_not_an_error() {
    let entries = parse_document("<rss><channel><title>x</title></channel></rss>", now()).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn repeated_child_elements_take_the_first_value() {
    let xml = r#"<rss><channel>
        <item><guid>a</guid><title>Outage</title><link>https://a.example/1</link>
        <link>https://a.example/2</link><title>Second title</title></item>
        <item><guid>b</guid><title>Resolved</title><link>https://a.example/3</link></item>
        </channel></rss>"#;
    let entries = parse_document(xml, now()).expect("duplicate children tolerated");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "Outage");
    assert_eq!(entries[0].link, "https://a.example/1");
    assert_eq!(entries[1].id, "b");
}

#[test]
fn atom_xhtml_content_feeds_body_and_category() {
    let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
        <entry><id>a</id><title>Chat</title><updated>2025-09-06</updated>
        <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Fixed and restored.</p><p>Thanks</p></div></content>
        </entry>
        <entry><id>b</id><title>Composer</title><updated>2025-09-06T08:00:00Z</updated>
        <summary>Plain summary</summary></entry>
        </feed>"#;
    let entries = parse_document(xml, now()).unwrap();
    assert_eq!(entries[0].body, "Fixed and restored. Thanks");
    assert_eq!(entries[0].category, Category::Resolved);
    assert_eq!(
        entries[0].published,
        Utc.with_ymd_and_hms(2025, 9, 6, 0, 0, 0).unwrap()
    );
    assert_eq!(entries[1].body, "Plain summary");
}
