//! Integration tests for full crawl passes against a mock site.

use std::sync::{Mutex, OnceLock};

use group_spy::models::{CollectionKind, Config, PacingConfig};
use group_spy::pipeline::{Crawler, PageWindow};
use group_spy::services::KeywordMatcher;
use group_spy::storage::{PostStore, SqliteStore};
use log::{Level, LevelFilter, Log, Metadata, Record};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GROUP_INFO: &str = r#"<html><head><title>上海租房</title></head><body>
    <div id="group-info"><h1>
        上海租房
    </h1></div>
    <a href="https://www.douban.com/group/10086/members">浏览所有成员 (3456)</a>
    <div class="group-loc">创建于2008-06-12  按时间排序</div>
    </body></html>"#;

/// Collects every warning logged by the crate under test.
struct WarningLog {
    lines: Mutex<Vec<String>>,
}

impl Log for WarningLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Install the warning collector once for the whole test binary.
fn warnings() -> &'static WarningLog {
    static LOGGER: OnceLock<WarningLog> = OnceLock::new();
    let logger = LOGGER.get_or_init(|| WarningLog {
        lines: Mutex::new(Vec::new()),
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(LevelFilter::Warn);
    }
    logger
}

/// Create a config pointed at the mock server with pacing switched off.
fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.site.base_url = server.uri();
    config.pacing = PacingConfig::disabled();
    config
}

fn group_listing(rows: &[(i64, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(id, title)| {
            format!(
                r#"<tr class="">
                    <td class="title"><a href="/group/topic/{id}/" title="{title}">{title}</a></td>
                    <td nowrap="nowrap"><a href="/people/author{id}/">author{id}</a></td>
                    <td nowrap="nowrap" class="r-count">3</td>
                </tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><table class="olt">
            <tr class="th"><td>讨论</td><td>作者</td><td>回应</td></tr>
            {rows}
        </table></body></html>"#
    )
}

fn detail_page(title: &str, content: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <div class="topic-doc">
          <span class="create-time color-green">2024-05-01 20:15:00</span>
          <div class="topic-content"><div class="rich-content">
            <p>{content}</p>
            <img src="https:\/\/img.example.com\/room.jpg">
          </div></div>
        </div>
        <ul id="comments"><li><p class="reply-content">还在吗？</p></li></ul>
        </body></html>"#
    )
}

async fn mount_page(server: &MockServer, p: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(p.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn matcher(keywords: &[&str], exclude: &[&str]) -> KeywordMatcher {
    let keywords: Vec<String> = keywords.iter().map(|s| s.to_string()).collect();
    let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
    KeywordMatcher::new(&keywords, &exclude).unwrap()
}

const ONE_PAGE: PageWindow = PageWindow { pages: 1, offset: 0 };

#[tokio::test]
async fn unknown_group_and_fuzzy_matched_post_are_stored() {
    let server = MockServer::start().await;
    mount_page(&server, "/group/10086/", GROUP_INFO.to_string()).await;
    mount_page(
        &server,
        "/group/10086/discussion",
        group_listing(&[(2001, "整租一室户")]),
    )
    .await;
    mount_page(
        &server,
        "/group/topic/2001/",
        detail_page("整租一室户", "小区就在花@园路旁边"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("spy.sqlite")).await.unwrap();
    let config = test_config(&server);
    let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();

    let summary = crawler
        .crawl_group("10086", &matcher(&["花园"], &[]), ONE_PAGE)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 1);

    let group = store
        .find_collection(CollectionKind::Group, "10086")
        .await
        .unwrap()
        .expect("group row created");
    assert_eq!(group.name, "上海租房");
    assert_eq!(group.member_count, Some(3456));
    assert!(group.created.is_some());
    assert!(!group.alt.contains('\\'));

    let post = store.find_group_post(2001).await.unwrap().expect("post stored");
    assert!(post.is_matched);
    assert_eq!(post.keyword_list, vec!["花园"]);
    assert_eq!(post.group_id.as_deref(), Some("10086"));
    assert_eq!(post.title, "整租一室户");
    assert_eq!(post.comments, vec!["还在吗？"]);
    assert_eq!(post.photos, vec!["https://img.example.com/room.jpg"]);
    assert!(post.alt.ends_with("/group/topic/2001/"));
    assert_eq!(post.author.unwrap().name, "author2001");
}

#[tokio::test]
async fn detail_failing_twice_stores_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "/group/10086/", GROUP_INFO.to_string()).await;
    mount_page(
        &server,
        "/group/10086/discussion",
        group_listing(&[(2001, "整租一室户")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/group/topic/2001/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let warnings = warnings();
    let store = SqliteStore::in_memory().await.unwrap();
    let config = test_config(&server);
    let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();

    let summary = crawler
        .crawl_group("10086", &matcher(&["花园"], &[]), ONE_PAGE)
        .await
        .unwrap();

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.inserted, 0);
    assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 0);

    let lines = warnings.lines.lock().unwrap();
    assert!(
        lines
            .iter()
            .any(|l| l.contains("Skipping post 2001") && l.contains("status 500")),
        "no warning for the lost post in {lines:?}"
    );
}

#[tokio::test]
async fn excluded_title_is_never_stored() {
    let server = MockServer::start().await;
    mount_page(&server, "/group/10086/", GROUP_INFO.to_string()).await;
    mount_page(
        &server,
        "/group/10086/discussion",
        group_listing(&[(3001, "求租 花园路附近"), (3002, "转租 花园路主卧")]),
    )
    .await;
    mount_page(&server, "/group/topic/3001/", detail_page("求租", "花园路")).await;
    mount_page(&server, "/group/topic/3002/", detail_page("转租", "花园路")).await;

    let store = SqliteStore::in_memory().await.unwrap();
    let config = test_config(&server);
    let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();

    let summary = crawler
        .crawl_group("10086", &matcher(&["花园"], &["求租"]), ONE_PAGE)
        .await
        .unwrap();

    assert_eq!(summary.excluded, 1);
    assert_eq!(summary.inserted, 1);
    assert!(store.find_group_post(3001).await.unwrap().is_none());
    assert!(store.find_group_post(3002).await.unwrap().is_some());
}

#[tokio::test]
async fn repeated_pass_keeps_one_record_with_first_content() {
    let server = MockServer::start().await;
    mount_page(&server, "/group/10086/", GROUP_INFO.to_string()).await;
    mount_page(
        &server,
        "/group/10086/discussion",
        group_listing(&[(4001, "花园路整租")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/group/topic/4001/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("t", "first content 花园")),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/group/topic/4001/",
        detail_page("t", "edited content 花园"),
    )
    .await;

    let store = SqliteStore::in_memory().await.unwrap();
    let config = test_config(&server);
    let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();
    let matcher = matcher(&["花园"], &[]);

    crawler.crawl_group("10086", &matcher, ONE_PAGE).await.unwrap();
    crawler.crawl_group("10086", &matcher, ONE_PAGE).await.unwrap();

    assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 1);
    let post = store.find_group_post(4001).await.unwrap().unwrap();
    assert!(post.content.contains("first content"));
}

#[tokio::test]
async fn doulist_listing_fetches_match_discovered_page_count() {
    let server = MockServer::start().await;

    let listing = |ids: &[i64]| -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div class="doulist-item"><div class="bd doulist-note">
                        <div class="title"><a href="/group/topic/{id}/">entry {id}</a></div>
                    </div></div>"#
                )
            })
            .collect();
        format!(
            r#"<html><body>{rows}
            <div class="paginator"><span class="thispage" data-total-page="3">1</span></div>
            </body></html>"#
        )
    };

    for (start, id) in [("0", 501), ("25", 502), ("50", 503)] {
        Mock::given(method("GET"))
            .and(path("/doulist/777/"))
            .and(query_param("start", start))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[id])))
            .expect(1)
            .mount(&server)
            .await;
    }
    // Info page, requested without a start parameter
    Mock::given(method("GET"))
        .and(path("/doulist/777/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>好房清单</h1>"))
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;
    for id in [501, 502, 503] {
        mount_page(
            &server,
            &format!("/group/topic/{id}/"),
            detail_page(&format!("清单条目 {id}"), "内容"),
        )
        .await;
    }

    let store = SqliteStore::in_memory().await.unwrap();
    let config = test_config(&server);
    let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();

    let summary = crawler.crawl_doulist("777").await.unwrap();
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.inserted, 3);

    let doulist = store
        .find_collection(CollectionKind::Doulist, "777")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doulist.name, "好房清单");

    let post = store.find_doulist_post(502).await.unwrap().unwrap();
    assert_eq!(post.title, "清单条目 502");
    assert_eq!(store.count_posts(CollectionKind::Doulist).await.unwrap(), 3);
}
