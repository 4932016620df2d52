#![cfg(feature = "inmem-store")]

mod common;

use corner::models::{NewSeries, PostFilter, PostStatus, Section, UpdatePost};
use corner::repo::inmem::InMemRepo;
use corner::repo::{PostRepo, RepoError, SeriesRepo, TagRepo};

use common::{day, draft, published, record, series, tag};

#[tokio::test]
async fn replace_post_tags_is_a_full_replacement() {
    let r = InMemRepo::new();
    let post = draft(&r, Section::Tech, "docker-basics").await;
    let (a, b, c) = (tag(&r, "docker", None).await, tag(&r, "rust", None).await, tag(&r, "linux", None).await);

    r.replace_post_tags(post, &[a, b]).await.unwrap();
    r.replace_post_tags(post, &[c]).await.unwrap();
    assert_eq!(r.tag_ids_for_post(post).await.unwrap(), vec![c]);

    // empty list clears everything
    r.replace_post_tags(post, &[]).await.unwrap();
    assert!(r.tag_ids_for_post(post).await.unwrap().is_empty());
    assert_eq!(r.count_tag_usage(c).await.unwrap(), 0);
}

#[tokio::test]
async fn replace_post_tags_with_unknown_tag_leaves_previous_set() {
    let r = InMemRepo::new();
    let post = draft(&r, Section::Tech, "kept-tags").await;
    let a = tag(&r, "docker", None).await;
    r.replace_post_tags(post, &[a]).await.unwrap();

    let err = r.replace_post_tags(post, &[a, uuid::Uuid::new_v4()]).await.unwrap_err();
    assert!(matches!(err, RepoError::Store(_)));
    assert_eq!(r.tag_ids_for_post(post).await.unwrap(), vec![a]);
}

#[tokio::test]
async fn set_post_series_assigns_position_one_and_clears() {
    let r = InMemRepo::new();
    let post = draft(&r, Section::Tech, "part-two").await;
    let first = series(&r, Section::Tech, "k8s-path").await;
    let second = series(&r, Section::Tech, "rust-path").await;

    r.insert_series_entry(first, post, Some(4));
    r.set_post_series(post, Some(second)).await.unwrap();
    assert_eq!(r.series_rows_for_post(post), vec![(second, Some(1))]);
    assert_eq!(r.first_series_id(post).await.unwrap(), Some(second));

    r.set_post_series(post, None).await.unwrap();
    assert!(r.series_rows_for_post(post).is_empty());
    assert_eq!(r.first_series_id(post).await.unwrap(), None);
}

#[tokio::test]
async fn first_series_prefers_lowest_position() {
    let r = InMemRepo::new();
    let post = draft(&r, Section::Tech, "shared").await;
    let late = series(&r, Section::Tech, "late").await;
    let early = series(&r, Section::Tech, "early").await;
    r.insert_series_entry(late, post, None);
    r.insert_series_entry(early, post, Some(2));
    assert_eq!(r.first_series_id(post).await.unwrap(), Some(early));
}

#[tokio::test]
async fn shared_tag_counts_only_count_given_tags() {
    let r = InMemRepo::new();
    let src = draft(&r, Section::Tech, "src").await;
    let other = draft(&r, Section::Tech, "other").await;
    let (a, b, c) = (tag(&r, "a", None).await, tag(&r, "b", None).await, tag(&r, "c", None).await);
    r.replace_post_tags(src, &[a, b]).await.unwrap();
    r.replace_post_tags(other, &[a, b, c]).await.unwrap();

    let counts = r.shared_tag_counts(&[a, b], &[other]).await.unwrap();
    assert_eq!(counts.get(&other), Some(&2));
    assert!(!counts.contains_key(&src));
}

#[tokio::test]
async fn slugs_are_unique_per_scope() {
    let r = InMemRepo::new();
    draft(&r, Section::Tech, "hello").await;
    // same slug in another section is fine
    draft(&r, Section::Fasec, "hello").await;
    let err = r.create_post(record(Section::Tech, "hello")).await.unwrap_err();
    assert!(matches!(err, RepoError::Store(_)));

    tag(&r, "docker", None).await;
    tag(&r, "docker", Some(Section::Tech)).await;
    let err = r.create_tag("Docker again", "docker", None).await.unwrap_err();
    assert!(matches!(err, RepoError::Store(_)));

    series(&r, Section::Tech, "path").await;
    let dup = NewSeries { section: Section::Tech, title: "Other".into(), slug: "path".into(), description: None };
    assert!(r.create_series(dup).await.is_err());
}

#[tokio::test]
async fn published_listing_is_newest_first_with_drafts_filtered() {
    let r = InMemRepo::new();
    published(&r, Section::Tech, "old", day(1)).await;
    published(&r, Section::Tech, "new", day(9)).await;
    draft(&r, Section::Tech, "wip").await;
    published(&r, Section::Fasec, "elsewhere", day(5)).await;

    let filter = PostFilter { section: Some(Section::Tech), status: Some(PostStatus::Published), ..Default::default() };
    assert_eq!(r.count_posts(&filter).await.unwrap(), 2);
    let items = r.list_post_summaries(&filter, 0, 10).await.unwrap();
    let slugs: Vec<_> = items.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, ["new", "old"]);

    let second_page = r.list_post_summaries(&filter, 1, 1).await.unwrap();
    assert_eq!(second_page[0].slug, "old");
}

#[tokio::test]
async fn search_term_matches_title_and_optionally_content() {
    let r = InMemRepo::new();
    published(&r, Section::Tech, "plain", day(1)).await;
    let mut filter = PostFilter { q: Some("  body of plain ".into()), ..Default::default() };
    assert_eq!(r.count_posts(&filter).await.unwrap(), 0);
    filter.search_content = true;
    assert_eq!(r.count_posts(&filter).await.unwrap(), 1);

    let by_title = PostFilter { q: Some("TITLE PLAIN".into()), ..Default::default() };
    assert_eq!(r.count_posts(&by_title).await.unwrap(), 1);
}

#[tokio::test]
async fn publish_and_unpublish_cycle() {
    let r = InMemRepo::new();
    let id = draft(&r, Section::Tech, "cycle").await;

    let state = r.publish_post(id, day(3)).await.unwrap();
    assert_eq!(state.status, PostStatus::Published);
    assert_eq!(state.published_at, Some(day(3)));

    // publishing again moves the timestamp
    let state = r.publish_post(id, day(4)).await.unwrap();
    assert_eq!(state.published_at, Some(day(4)));

    let state = r.unpublish_post(id).await.unwrap();
    assert_eq!(state.status, PostStatus::Draft);
    assert!(state.published_at.is_none());
    assert!(r.get_published_post(Section::Tech, "cycle").await.unwrap().is_none());

    assert!(matches!(r.publish_post(uuid::Uuid::new_v4(), day(1)).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn update_post_touches_only_given_fields() {
    let r = InMemRepo::new();
    let id = draft(&r, Section::Tech, "editable").await;
    let upd: UpdatePost = serde_json::from_value(serde_json::json!({"title": "Renamed"})).unwrap();
    let head = r.update_post(id, upd).await.unwrap();
    assert_eq!(head.title, "Renamed");
    assert_eq!(head.slug, "editable");
    assert_eq!(head.status, PostStatus::Draft);
}

#[tokio::test]
async fn list_tags_scopes_to_global_plus_section() {
    let r = InMemRepo::new();
    tag(&r, "docker", None).await;
    tag(&r, "kubernetes", Some(Section::Tech)).await;
    tag(&r, "anatomy", Some(Section::Fasec)).await;

    let tech: Vec<_> = r.list_tags(Some(Section::Tech)).await.unwrap().into_iter().map(|t| t.slug).collect();
    assert_eq!(tech, ["docker", "kubernetes"]);
    assert_eq!(r.list_tags(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
    let r = InMemRepo::new();
    let exact = draft(&r, Section::Tech, "exact").await;
    let near = draft(&r, Section::Tech, "near").await;
    let title = |t: &str| serde_json::from_value::<UpdatePost>(serde_json::json!({"title": t})).unwrap();
    r.update_post(exact, title("Cut costs by 100%")).await.unwrap();
    r.update_post(near, title("Cut costs by 1000x")).await.unwrap();

    let filter = PostFilter { q: Some("100%".into()), ..Default::default() };
    let hits = r.list_post_summaries(&filter, 0, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, exact);

    let underscore = PostFilter { q: Some("by_1".into()), ..Default::default() };
    assert_eq!(r.count_posts(&underscore).await.unwrap(), 0);
}
