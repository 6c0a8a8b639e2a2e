mod common;

use std::collections::HashSet;

use common::{CollectingSink, FakePage, FakeSession};
use portal_engine::{CrawlError, CrawlSettings, Crawler, HostPolicy, NullSink};
use pretty_assertions::assert_eq;

const SEED: &str = "https://learn.example.edu/d2l/home";

fn urls(records: &[portal_core::PageRecord]) -> Vec<&str> {
    records.iter().map(|p| p.url.as_str()).collect()
}

#[tokio::test]
async fn failing_page_does_not_abort_the_crawl() {
    let mut session = FakeSession::new()
        .page(
            SEED,
            FakePage::new("Home", "Welcome").links([
                "https://learn.example.edu/a",
                "https://learn.example.edu/b",
                "https://learn.example.edu/c",
            ]),
        )
        .page("https://learn.example.edu/a", FakePage::new("A", "alpha"))
        .page("https://learn.example.edu/c", FakePage::new("C", "gamma"));

    let result = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(
        urls(&result.pages),
        vec![
            SEED,
            "https://learn.example.edu/a",
            "https://learn.example.edu/b",
            "https://learn.example.edu/c",
        ]
    );
    let failed = &result.pages[2];
    assert!(failed.is_error());
    assert_eq!(failed.title, "");
    assert!(failed.text.starts_with("Error: "));
    assert_eq!(result.pages[3].title, "C");
    assert_eq!(result.pages[3].error, None);
}

#[tokio::test]
async fn traversal_is_capped_and_never_revisits() {
    let mut links: Vec<String> = (0..100)
        .map(|i| format!("https://learn.example.edu/page/{i}"))
        .collect();
    links.push(SEED.to_string());
    links.push("https://learn.example.edu/page/3".to_string());

    let mut session = FakeSession::new().page(SEED, FakePage::new("Home", "").links(links.clone()));
    for link in &links[..100] {
        session = session.page(link, FakePage::new("P", "body").links([SEED, link.as_str()]));
    }

    let result = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(result.pages.len(), 25);
    let unique: HashSet<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(unique.len(), 25);
    assert_eq!(session.visits.len(), 25);
    assert_eq!(result.pages[24].url, "https://learn.example.edu/page/23");
}

#[tokio::test]
async fn only_same_site_non_logout_links_are_followed() {
    let mut session = FakeSession::new().page(
        SEED,
        FakePage::new("Home", "").links([
            "https://learn.example.edu/d2l/le/content/42/Home",
            "https://learn.example.edu/d2l/logout",
            "https://learn.example.edu/users/sign_out",
            "https://elsewhere.example.com/d2l/home/1",
            "https://evil-learn.example.edu.attacker.net/x",
            "mailto:help@learn.example.edu",
            "ftp://learn.example.edu/file",
            "https://cdn.learn.example.edu/syllabus",
        ]),
    );
    for page in [
        "https://learn.example.edu/d2l/le/content/42/Home",
        "https://cdn.learn.example.edu/syllabus",
    ] {
        session = session.page(page, FakePage::new("ok", ""));
    }

    let result = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(
        urls(&result.pages),
        vec![
            SEED,
            "https://learn.example.edu/d2l/le/content/42/Home",
            "https://cdn.learn.example.edu/syllabus",
        ]
    );
}

#[tokio::test]
async fn substring_policy_admits_hosts_containing_the_seed_host() {
    let mut session = FakeSession::new()
        .page(
            SEED,
            FakePage::new("Home", "").links(["https://learn.example.edu.mirror.net/x"]),
        )
        .page("https://learn.example.edu.mirror.net/x", FakePage::new("Mirror", ""));
    let crawler = Crawler::new(CrawlSettings {
        host_policy: HostPolicy::Substring,
        ..CrawlSettings::default()
    });

    let result = crawler.crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(result.pages.len(), 2);
}

#[tokio::test]
async fn depth_is_one_hop_unless_configured() {
    let build = || {
        FakeSession::new()
            .page(SEED, FakePage::new("Home", "").links(["https://learn.example.edu/child"]))
            .page(
                "https://learn.example.edu/child",
                FakePage::new("Child", "").links(["https://learn.example.edu/grandchild"]),
            )
            .page("https://learn.example.edu/grandchild", FakePage::new("Grandchild", ""))
    };

    let mut session = build();
    let shallow = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();
    assert_eq!(shallow.pages.len(), 2);

    let mut session = build();
    let deeper = Crawler::new(CrawlSettings {
        max_hops: 2,
        ..CrawlSettings::default()
    })
    .crawl(&mut session, SEED, &NullSink)
    .await
    .unwrap();
    assert_eq!(deeper.pages.len(), 3);

    let mut session = build();
    let seed_only = Crawler::new(CrawlSettings {
        max_hops: 0,
        ..CrawlSettings::default()
    })
    .crawl(&mut session, SEED, &NullSink)
    .await
    .unwrap();
    assert_eq!(urls(&seed_only.pages), vec![SEED]);
}

#[tokio::test]
async fn unreachable_seed_fails_the_crawl() {
    let mut session = FakeSession::new();

    let err = Crawler::default()
        .crawl(&mut session, SEED, &NullSink)
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::SeedUnreachable { ref url, .. } if url == SEED));
    assert_eq!(session.visits, vec![SEED.to_string()]);
}

#[tokio::test]
async fn seed_with_partial_document_still_discovers_links() {
    let mut session = FakeSession::new()
        .partial(
            SEED,
            FakePage::new("", "").links(["https://learn.example.edu/d2l/home/7"]),
        )
        .page("https://learn.example.edu/d2l/home/7", FakePage::new("CS 246 - Home", ""));

    let result = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(result.pages.len(), 2);
    assert!(result.pages[0].is_error());
    assert_eq!(result.pages[1].title, "CS 246 - Home");
}

#[tokio::test]
async fn fixed_list_visits_every_url_in_order() {
    let list = vec![
        "https://a.example/1".to_string(),
        "https://a.example/missing".to_string(),
        "https://b.example/2".to_string(),
    ];
    let mut session = FakeSession::new()
        .page("https://a.example/1", FakePage::new("One", "1").links(["https://a.example/x"]))
        .page("https://b.example/2", FakePage::new("Two", "2"));
    let sink = CollectingSink::default();

    let result = Crawler::default().visit_all(&mut session, &list, &sink).await;

    assert_eq!(urls(&result.pages), list.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(result.pages[1].is_error());
    assert_eq!(session.visits, list);
    assert!(sink.lines().contains(&"Navigating to https://b.example/2".to_string()));
}

#[tokio::test]
async fn page_text_is_truncated() {
    let long = "x".repeat(100);
    let mut session = FakeSession::new().page(SEED, FakePage::new("Home", &long));
    let crawler = Crawler::new(CrawlSettings {
        max_text_chars: 10,
        ..CrawlSettings::default()
    });

    let result = crawler.crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(result.pages[0].text.len(), 10);
}

#[tokio::test]
async fn zero_page_cap_visits_nothing() {
    let mut session = FakeSession::new()
        .page(SEED, FakePage::new("Home", "").links(["https://learn.example.edu/a"]))
        .page("https://learn.example.edu/a", FakePage::new("A", ""));
    let crawler = Crawler::new(CrawlSettings {
        max_pages: 0,
        ..CrawlSettings::default()
    });

    let result = crawler.crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert!(result.pages.is_empty());
    assert!(session.visits.is_empty());
}

#[tokio::test]
async fn redirected_seed_is_not_fetched_again() {
    let landing = "https://learn.example.edu/d2l/home/landing";
    let mut session = FakeSession::new()
        .redirect(SEED, landing)
        .page(
            landing,
            FakePage::new("Home", "").links([landing, "https://learn.example.edu/a"]),
        )
        .page("https://learn.example.edu/a", FakePage::new("A", ""));

    let result = Crawler::default().crawl(&mut session, SEED, &NullSink).await.unwrap();

    assert_eq!(urls(&result.pages), vec![SEED, "https://learn.example.edu/a"]);
    assert_eq!(
        session.visits,
        vec![SEED.to_string(), "https://learn.example.edu/a".to_string()]
    );
}
