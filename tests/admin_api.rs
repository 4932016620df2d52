#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::http::header;
use actix_web::test;
use chrono::{DateTime, Utc};
use corner::models::Section;
use corner::repo::inmem::InMemRepo;
use corner::repo::TagRepo;
use serde_json::{json, Value};

use common::{day, draft, json, published, series, slugs, state, tag, ADMIN_TOKEN, USER_TOKEN};

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

fn code(v: &Value) -> &str {
    v["error"]["code"].as_str().unwrap()
}

#[actix_web::test]
async fn admin_gate_distinguishes_failure_modes() {
    let app = app!(state(InMemRepo::new()));
    let cases: [(Option<&str>, u16, &str); 5] = [
        (None, 401, "NO_TOKEN"),
        (Some("Basic dXNlcjpwdw=="), 401, "NO_TOKEN"),
        (Some("Bearer   "), 401, "EMPTY_TOKEN"),
        (Some("Bearer forged"), 401, "INVALID_JWT"),
        (Some("Bearer user-token"), 403, "NOT_ADMIN"),
    ];
    for (auth, status, expected) in cases {
        let mut req = test::TestRequest::get().uri("/admin/posts");
        if let Some(value) = auth {
            req = req.insert_header((header::AUTHORIZATION, value));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), status, "{auth:?}");
        // no-store applies to rejections as well
        assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-store, no-cache, must-revalidate, proxy-revalidate");
        assert_eq!(code(&json(resp).await), expected, "{auth:?}");
    }
}

#[actix_web::test]
async fn admin_responses_are_never_cached() {
    let app = app!(state(InMemRepo::new()));
    let req = test::TestRequest::get().uri("/admin/tags").insert_header(bearer(ADMIN_TOKEN)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let h = resp.headers();
    assert!(h.get(header::CACHE_CONTROL).unwrap().to_str().unwrap().contains("no-store"));
    assert_eq!(h.get(header::PRAGMA).unwrap(), "no-cache");
    assert_eq!(h.get(header::EXPIRES).unwrap(), "0");

    // public routes stay cacheable
    let resp = test::call_service(&app, test::TestRequest::get().uri("/tags").to_request()).await;
    assert!(resp.headers().get(header::PRAGMA).is_none());
}

#[actix_web::test]
async fn post_lifecycle_create_publish_unpublish() {
    let app = app!(state(InMemRepo::new()));

    let req = test::TestRequest::post()
        .uri("/admin/posts")
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({
            "section": "TECH",
            "title": "Docker from scratch",
            "slug": "docker-from-scratch",
            "content_json": {"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "images and layers"}]}]}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let head = json(resp).await;
    assert_eq!(head["status"], "DRAFT");
    let id = head["id"].as_str().unwrap().to_string();

    // drafts are invisible publicly
    let resp = test::call_service(&app, test::TestRequest::get().uri("/posts/TECH/docker-from-scratch").to_request()).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get().uri(&format!("/admin/posts/{id}")).insert_header(bearer(ADMIN_TOKEN)).to_request();
    let full = json(test::call_service(&app, req).await).await;
    assert_eq!(full["content_text"], "images and layers");
    assert_eq!(full["reading_time"], 1);

    let publish = |uri: String| test::TestRequest::post().uri(&uri).insert_header(bearer(ADMIN_TOKEN)).to_request();
    let first = json(test::call_service(&app, publish(format!("/admin/posts/{id}/publish"))).await).await;
    assert_eq!(first["status"], "PUBLISHED");
    let second = json(test::call_service(&app, publish(format!("/admin/posts/{id}/publish"))).await).await;
    let at = |v: &Value| v["published_at"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    assert!(at(&second) >= at(&first));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/posts/TECH/docker-from-scratch").to_request()).await;
    assert_eq!(resp.status(), 200);

    let state = json(test::call_service(&app, publish(format!("/admin/posts/{id}/unpublish"))).await).await;
    assert_eq!(state["status"], "DRAFT");
    assert!(state["published_at"].is_null());

    let resp = test::call_service(&app, publish(format!("/admin/posts/{}/publish", uuid::Uuid::new_v4()))).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(code(&json(resp).await), "POST_NOT_FOUND");
}

#[actix_web::test]
async fn create_post_validates_body() {
    let app = app!(state(InMemRepo::new()));
    for body in [
        json!({"section": "TECH", "title": "ab", "slug": "valid-slug"}),
        json!({"section": "BLOG", "title": "Valid", "slug": "valid-slug"}),
        json!({"title": "Valid", "slug": "valid-slug"}),
    ] {
        let req = test::TestRequest::post().uri("/admin/posts").insert_header(bearer(ADMIN_TOKEN)).set_json(&body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "{body}");
        assert_eq!(code(&json(resp).await), "BAD_BODY");
    }
}

#[actix_web::test]
async fn update_rejects_status_and_applies_fields() {
    let repo = InMemRepo::new();
    let id = draft(&repo, Section::Tech, "editable").await;
    let app = app!(state(repo));

    let req = test::TestRequest::put()
        .uri(&format!("/admin/posts/{id}"))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"status": "PUBLISHED"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(code(&json(resp).await), "BAD_BODY");

    let req = test::TestRequest::put()
        .uri(&format!("/admin/posts/{id}"))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"title": "Edited title", "excerpt": null}))
        .to_request();
    let head = json(test::call_service(&app, req).await).await;
    assert_eq!(head["title"], "Edited title");
    assert_eq!(head["status"], "DRAFT");

    let req = test::TestRequest::put()
        .uri(&format!("/admin/posts/{}", uuid::Uuid::new_v4()))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"title": "Nobody home"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn replace_tags_caps_at_three() {
    let repo = InMemRepo::new();
    let post = draft(&repo, Section::Tech, "tagged").await;
    let mut ids = Vec::new();
    for slug in ["a", "b", "c", "d"] {
        ids.push(tag(&repo, slug, None).await);
    }
    let app = app!(state(repo.clone()));
    let put = |body: Value| {
        test::TestRequest::put()
            .uri(&format!("/admin/posts/{post}/tags"))
            .insert_header(bearer(ADMIN_TOKEN))
            .set_json(body)
            .to_request()
    };

    let resp = test::call_service(&app, put(json!({"tag_ids": ids}))).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(code(&json(resp).await), "BAD_BODY");

    let v = json(test::call_service(&app, put(json!({"tag_ids": &ids[..3]}))).await).await;
    assert_eq!(v["ok"], true);
    assert_eq!(v["tag_ids"].as_array().unwrap().len(), 3);
    assert_eq!(repo.tag_ids_for_post(post).await.unwrap().len(), 3);

    let v = json(test::call_service(&app, put(json!({"tag_ids": []}))).await).await;
    assert!(v["tag_ids"].as_array().unwrap().is_empty());
    assert!(repo.tag_ids_for_post(post).await.unwrap().is_empty());

    let req = test::TestRequest::put()
        .uri(&format!("/admin/posts/{}/tags", uuid::Uuid::new_v4()))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"tag_ids": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(code(&json(resp).await), "POST_NOT_FOUND");
}

#[actix_web::test]
async fn series_assignment_roundtrip() {
    let repo = InMemRepo::new();
    let post = draft(&repo, Section::Tech, "chapter").await;
    let app = app!(state(repo.clone()));

    let req = test::TestRequest::post()
        .uri("/admin/series")
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"section": "TECH", "title": "Kubernetes path", "slug": "k8s-path"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let series_id = json(resp).await["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri("/admin/series?section=TECH").insert_header(bearer(ADMIN_TOKEN)).to_request();
    assert_eq!(slugs(&json(test::call_service(&app, req).await).await), ["k8s-path"]);

    let set = |body: Value| {
        test::TestRequest::put()
            .uri(&format!("/admin/posts/{post}/series"))
            .insert_header(bearer(ADMIN_TOKEN))
            .set_json(body)
            .to_request()
    };
    let get = || test::TestRequest::get().uri(&format!("/admin/posts/{post}/series")).insert_header(bearer(ADMIN_TOKEN)).to_request();

    let v = json(test::call_service(&app, get()).await).await;
    assert!(v["series_id"].is_null());

    let v = json(test::call_service(&app, set(json!({"series_id": series_id}))).await).await;
    assert_eq!(v["ok"], true);
    assert_eq!(v["series_id"], series_id.as_str());
    assert_eq!(repo.series_rows_for_post(post).len(), 1);
    assert_eq!(json(test::call_service(&app, get()).await).await["series_id"], series_id.as_str());

    let v = json(test::call_service(&app, set(json!({"series_id": null}))).await).await;
    assert!(v["series_id"].is_null());
    assert!(repo.series_rows_for_post(post).is_empty());
}

#[actix_web::test]
async fn tag_crud_and_in_use_guard() {
    let repo = InMemRepo::new();
    let post = draft(&repo, Section::Tech, "uses-tag").await;
    let app = app!(state(repo.clone()));

    let req = test::TestRequest::post()
        .uri("/admin/tags")
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"name": "  Cloud Native  ", "section": "TECH"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let item = json(resp).await["item"].clone();
    assert_eq!(item["name"], "Cloud Native");
    assert_eq!(item["slug"], "cloud-native");
    let tag_id: uuid::Uuid = item["id"].as_str().unwrap().parse().unwrap();

    let req = test::TestRequest::post()
        .uri("/admin/tags")
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"name": "   "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch()
        .uri(&format!("/admin/tags/{tag_id}"))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"slug": " CNCF ", "section": null}))
        .to_request();
    let v = json(test::call_service(&app, req).await).await;
    assert_eq!(v["item"]["slug"], "cncf");
    assert!(v["item"]["section"].is_null());

    let req = test::TestRequest::patch()
        .uri(&format!("/admin/tags/{}", uuid::Uuid::new_v4()))
        .insert_header(bearer(ADMIN_TOKEN))
        .set_json(json!({"name": "Ghost"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(code(&json(resp).await), "TAG_NOT_FOUND");

    repo.replace_post_tags(post, &[tag_id]).await.unwrap();
    let delete = || test::TestRequest::delete().uri(&format!("/admin/tags/{tag_id}")).insert_header(bearer(ADMIN_TOKEN)).to_request();
    let resp = test::call_service(&app, delete()).await;
    assert_eq!(resp.status(), 409);
    assert_eq!(code(&json(resp).await), "TAG_IN_USE");

    repo.replace_post_tags(post, &[]).await.unwrap();
    let resp = test::call_service(&app, delete()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json(resp).await, json!({"ok": true}));
    assert!(repo.list_tags(None).await.unwrap().is_empty());
}

#[actix_web::test]
async fn admin_list_includes_drafts_with_series_and_tags() {
    let repo = InMemRepo::new();
    let live = published(&repo, Section::Tech, "live", day(1)).await;
    draft(&repo, Section::Tech, "wip").await;
    published(&repo, Section::Fasec, "other-section", day(2)).await;
    let t = tag(&repo, "ops", Some(Section::Fasec)).await;
    repo.replace_post_tags(live, &[t]).await.unwrap();
    let s = series(&repo, Section::Tech, "ops-path").await;
    repo.insert_series_entry(s, live, Some(1));
    let app = app!(state(repo));

    let req = test::TestRequest::get().uri("/admin/posts?section=TECH").insert_header(bearer(ADMIN_TOKEN)).to_request();
    let v = json(test::call_service(&app, req).await).await;
    assert_eq!(v["total"], 2);
    assert_eq!(v["limit"], 20);
    let live_row = v["items"].as_array().unwrap().iter().find(|p| p["slug"] == "live").unwrap();
    assert_eq!(live_row["series"]["slug"], "ops-path");
    // admin rows carry every tag, even one scoped to another section
    assert_eq!(live_row["tags"][0]["slug"], "ops");

    let req = test::TestRequest::get().uri("/admin/posts?status=DRAFT").insert_header(bearer(ADMIN_TOKEN)).to_request();
    assert_eq!(slugs(&json(test::call_service(&app, req).await).await), ["wip"]);

    let req = test::TestRequest::get().uri("/admin/posts?limit=51").insert_header(bearer(ADMIN_TOKEN)).to_request();
    assert_eq!(code(&json(test::call_service(&app, req).await).await), "BAD_QUERY");
}

#[actix_web::test]
async fn user_token_cannot_mutate() {
    let repo = InMemRepo::new();
    let id = draft(&repo, Section::Tech, "protected").await;
    let app = app!(state(repo));
    let req = test::TestRequest::post().uri(&format!("/admin/posts/{id}/publish")).insert_header(bearer(USER_TOKEN)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(code(&json(resp).await), "NOT_ADMIN");
}

#[actix_web::test]
async fn admin_list_huge_page_is_past_the_end() {
    let repo = InMemRepo::new();
    draft(&repo, Section::Tech, "wip").await;
    let app = app!(state(repo));
    let req = test::TestRequest::get()
        .uri("/admin/posts?page=9223372036854775807&limit=50")
        .insert_header(bearer(ADMIN_TOKEN))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v = json(resp).await;
    assert!(v["items"].as_array().unwrap().is_empty());
    assert_eq!(v["total"], 1);
}
