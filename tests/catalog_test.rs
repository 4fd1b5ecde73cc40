//! Integration tests for the catalog service against in-memory stores.

mod common;

use bytes::Bytes;
use common::{BUCKET, TestHarness, strings};
use image_catalog::services::{
    catalog_service::{CatalogError, MetadataStatus, NewImage},
    diagnostics::CatalogEvent,
    object_store::ObjectStore,
};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn upload_records_size_type_and_key() {
    let h = TestHarness::new().await;

    let receipt = h
        .catalog
        .upload_image(NewImage {
            bytes: Bytes::from_static(b"abc"),
            original_name: "photo.png".into(),
            size_hint: None,
            tags_raw: None,
        })
        .await
        .unwrap();

    assert_eq!(receipt.object_key, format!("uploads/{}.png", receipt.id));
    assert_eq!(receipt.name, "photo.png");

    let stored = h.objects.object(&receipt.object_key).unwrap();
    assert_eq!(stored.body.as_ref(), b"abc");
    assert_eq!(stored.content_type, "image/png");

    let entry = h.catalog.get_image(&receipt.id).await.unwrap();
    assert_eq!(entry.image.size, 3);
    assert_eq!(entry.image.content_type, "image/png");
    assert_eq!(entry.image.name, "photo.png");
    assert!(entry.tags.is_empty());

    let descriptor = h.catalog.describe(entry).await.unwrap();
    assert_eq!(descriptor.id, receipt.id);
    assert!(descriptor.url.contains(&receipt.object_key));
    assert!(descriptor.url.contains("X-Amz-Expires=3600"));
}

#[tokio::test]
async fn recorded_size_is_bytes_received_not_hint() {
    let h = TestHarness::new().await;

    let receipt = h
        .catalog
        .upload_image(NewImage {
            bytes: Bytes::from_static(b"12345"),
            original_name: "a.jpg".into(),
            size_hint: Some(99),
            tags_raw: None,
        })
        .await
        .unwrap();

    let entry = h.catalog.get_image(&receipt.id).await.unwrap();
    assert_eq!(entry.image.size, 5);
    assert!(h.observer.events().contains(&CatalogEvent::SizeHintMismatch {
        image_id: receipt.id.clone(),
        hinted: 99,
        actual: 5,
    }));
}

#[tokio::test]
async fn unknown_extension_falls_back_to_octet_stream() {
    let h = TestHarness::new().await;
    let id = h.upload("notes", b"plain", None).await;

    let entry = h.catalog.get_image(&id).await.unwrap();
    assert_eq!(entry.image.object_key, format!("uploads/{}", id));
    assert_eq!(entry.image.content_type, "application/octet-stream");
}

#[tokio::test]
async fn upload_tags_are_trimmed_and_deduplicated() {
    let h = TestHarness::new().await;
    let id = h.upload("cat.gif", b"GIF89a", Some("a, b ,b,")).await;

    let entry = h.catalog.get_image(&id).await.unwrap();
    assert_eq!(entry.tags, strings(&["a", "b"]));

    let tags = h.catalog.list_tags().await.unwrap();
    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[tokio::test]
async fn tags_are_shared_between_images() {
    let h = TestHarness::new().await;
    let first = h.upload("one.png", b"1", Some("sunset")).await;
    let second = h.upload("two.png", b"2", Some("sunset,beach")).await;

    assert_eq!(h.catalog.list_tags().await.unwrap().len(), 2);

    let tagged = h.catalog.list_images_by_tag("sunset").await.unwrap();
    let ids: Vec<_> = tagged.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, [first, second.clone()]);

    let beach = h.catalog.list_images_by_tag("beach").await.unwrap();
    assert_eq!(beach.len(), 1);
    assert_eq!(beach[0].tags, strings(&["sunset", "beach"]));
}

#[tokio::test]
async fn attach_reports_only_new_tags_and_is_idempotent() {
    let h = TestHarness::new().await;
    let id = h.upload("x.webp", b"RIFF", Some("a")).await;

    let added = h
        .catalog
        .attach_tags(&id, &strings(&["a", " b ", "c", "b"]))
        .await
        .unwrap();
    assert_eq!(added, strings(&["b", "c"]));

    let again = h.catalog.attach_tags(&id, &strings(&["b"])).await.unwrap();
    assert!(again.is_empty());

    assert_eq!(h.catalog.list_images_by_tag("b").await.unwrap().len(), 1);
    assert_eq!(
        h.catalog.get_image(&id).await.unwrap().tags,
        strings(&["a", "b", "c"])
    );
}

#[tokio::test]
async fn attach_rejects_empty_names_and_unknown_images() {
    let h = TestHarness::new().await;
    let id = h.upload("x.png", b"x", None).await;

    let err = h.catalog.attach_tags(&id, &[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidInput(_)));

    let err = h
        .catalog
        .attach_tags(&id, &strings(&["  ", ""]))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidInput(_)));

    let err = h
        .catalog
        .attach_tags("missing", &strings(&["a"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ImageNotFound(id) if id == "missing"));

    assert!(h.catalog.list_tags().await.unwrap().is_empty());
}

#[tokio::test]
async fn tag_lookup_is_exact() {
    let h = TestHarness::new().await;
    h.upload("x.png", b"x", Some("Sunset")).await;

    let err = h.catalog.list_images_by_tag("sunset").await.unwrap_err();
    assert!(matches!(err, CatalogError::TagNotFound(name) if name == "sunset"));
    assert_eq!(h.catalog.list_images_by_tag("Sunset").await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_catalog_lists_nothing() {
    let h = TestHarness::new().await;
    assert!(h.catalog.list_images().await.unwrap().is_empty());
    assert!(h.catalog.list_tags().await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_keeps_upload_order() {
    let h = TestHarness::new().await;
    let a = h.upload("a.png", b"a", None).await;
    let b = h.upload("b.jpg", b"bb", Some("t")).await;

    let listed = h.catalog.list_images().await.unwrap();
    let ids: Vec<_> = listed.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, [a, b]);
    assert_eq!(listed[1].size, 2);
    assert_eq!(listed[1].tags, strings(&["t"]));
}

#[tokio::test]
async fn delete_removes_payload_record_and_links() {
    let h = TestHarness::new().await;
    let id = h.upload("gone.png", b"bye", Some("old")).await;
    let key = format!("uploads/{}.png", id);

    let removed = h.catalog.delete_image(&id).await.unwrap();
    assert_eq!(removed.object_key, key);
    assert!(h.objects.object(&key).is_none());

    let err = h.catalog.get_image(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::ImageNotFound(_)));

    // tag survives, but nothing carries it anymore
    assert!(h.catalog.list_images_by_tag("old").await.unwrap().is_empty());

    let err = h.catalog.delete_image(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::ImageNotFound(_)));
}

#[tokio::test]
async fn failed_object_delete_keeps_the_record() {
    let h = TestHarness::new().await;
    let id = h.upload("keep.png", b"keep", Some("k")).await;
    h.objects.fail_delete.store(true, Ordering::SeqCst);

    let err = h.catalog.delete_image(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::StorageUnavailable(_)));

    let entry = h.catalog.get_image(&id).await.unwrap();
    assert_eq!(entry.tags, strings(&["k"]));
}

#[tokio::test]
async fn failed_link_cleanup_does_not_stop_the_delete() {
    let h = TestHarness::new().await;
    let id = h.upload("x.png", b"x", Some("t")).await;
    sqlx::query("DROP TABLE image_tags")
        .execute(h.metadata().pool())
        .await
        .unwrap();

    let removed = h.catalog.delete_image(&id).await.unwrap();
    assert_eq!(removed.id, id);
    assert!(h.objects.object(&removed.object_key).is_none());
    assert!(h.metadata().find_image(&id).await.unwrap().is_none());

    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        CatalogEvent::AssociationCleanupFailed { image_id, .. } if *image_id == id
    )));
}

#[tokio::test]
async fn failed_record_delete_is_reported_after_payload_is_gone() {
    let h = TestHarness::new().await;
    let id = h.upload("x.png", b"x", Some("t")).await;
    let key = format!("uploads/{}.png", id);
    sqlx::query(
        "CREATE TRIGGER refuse_image_delete BEFORE DELETE ON images
         BEGIN SELECT RAISE(ABORT, 'record is locked'); END",
    )
    .execute(h.metadata().pool())
    .await
    .unwrap();

    let err = h.catalog.delete_image(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::Metadata(_)), "{err}");
    assert!(h.objects.object(&key).is_none());

    // the record outlives its payload, without its tag links
    let entry = h.catalog.get_image(&id).await.unwrap();
    assert!(entry.tags.is_empty());
}

#[tokio::test]
async fn concurrent_creators_share_one_tag_row() {
    let h = TestHarness::new().await;

    let (first, second) = tokio::join!(
        h.metadata().find_or_create_tag("fresh"),
        h.metadata().find_or_create_tag("fresh"),
    );
    assert_eq!(first.unwrap().id, second.unwrap().id);

    let (a, b) = tokio::join!(
        h.upload("a.png", b"a", Some("shared")),
        h.upload("b.png", b"b", Some("shared")),
    );
    assert_ne!(a, b);

    let names: Vec<_> = h
        .catalog
        .list_tags()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, strings(&["fresh", "shared"]));
    assert_eq!(h.catalog.list_images_by_tag("shared").await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_object_write_records_nothing() {
    let h = TestHarness::new().await;
    h.objects.fail_put.store(true, Ordering::SeqCst);

    let err = h
        .catalog
        .upload_image(NewImage {
            bytes: Bytes::from_static(b"data"),
            original_name: "x.png".into(),
            size_hint: None,
            tags_raw: Some("a".into()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::StorageUnavailable(_)));

    assert!(h.objects.keys().is_empty());
    assert!(h.metadata().list_images().await.unwrap().is_empty());
    assert!(h.catalog.list_tags().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_record_write_still_returns_the_id() {
    let h = TestHarness::new().await;
    sqlx::query("DROP TABLE image_tags")
        .execute(h.metadata().pool())
        .await
        .unwrap();
    sqlx::query("DROP TABLE images")
        .execute(h.metadata().pool())
        .await
        .unwrap();

    let id = h.upload("orphan.png", b"data", Some("a,b")).await;

    assert!(h.objects.object(&format!("uploads/{}.png", id)).is_some());
    let events = h.observer.events();
    assert!(events.iter().any(|e| matches!(
        e,
        CatalogEvent::ImageRecordWriteFailed { image_id, .. } if *image_id == id
    )));
    let tags = h.catalog.list_tags().await.unwrap();
    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);

    let failed_tags: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CatalogEvent::TagAssociationFailed { tag, .. } => Some(tag.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(failed_tags, ["a", "b"]);
}

#[tokio::test]
async fn unsignable_entries_are_skipped_in_listings() {
    let h = TestHarness::new().await;
    let ok = h.upload("ok.png", b"1", Some("t")).await;
    let bad = h.upload("bad.png", b"2", Some("t")).await;
    let bad_key = format!("uploads/{}.png", bad);
    h.objects.refuse_to_sign(&bad_key);

    let listed = h.catalog.list_images().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ok);

    let tagged = h.catalog.list_images_by_tag("t").await.unwrap();
    assert_eq!(tagged.len(), 1);

    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        CatalogEvent::DescriptorSkipped { object_key, .. } if *object_key == bad_key
    )));

    // a single lookup surfaces the failure instead
    let entry = h.catalog.get_image(&bad).await.unwrap();
    let err = h.catalog.describe(entry).await.unwrap_err();
    assert!(matches!(err, CatalogError::StorageUnavailable(_)));
}

#[tokio::test]
async fn content_is_served_with_recorded_type() {
    let h = TestHarness::new().await;
    let id = h.upload("pic.svg", b"<svg/>", None).await;

    let content = h.catalog.image_content(&id).await.unwrap();
    assert_eq!(content.bytes.as_ref(), b"<svg/>");
    assert_eq!(content.content_type, "image/svg+xml");
    assert_eq!(content.name, "pic.svg");

    let err = h.catalog.image_content("nope").await.unwrap_err();
    assert!(matches!(err, CatalogError::ImageNotFound(_)));
}

#[tokio::test]
async fn content_of_a_vanished_object_is_not_found() {
    let h = TestHarness::new().await;
    let id = h.upload("pic.png", b"x", None).await;
    h.objects.delete(BUCKET, &format!("uploads/{}.png", id)).await.unwrap();

    let err = h.catalog.image_content(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::ImageNotFound(_)));
}

#[tokio::test]
async fn without_metadata_uploads_succeed_and_listing_comes_from_storage() {
    let h = TestHarness::without_metadata();
    let a = h.upload("a.png", b"aaaa", Some("ignored")).await;
    let b = h.upload("b.JPEG", b"bb", None).await;
    h.objects.seed("uploads/", b"");
    h.objects.seed("elsewhere/c.png", b"c");

    let listed = h.catalog.list_images().await.unwrap();
    let mut ids: Vec<_> = listed.iter().map(|d| d.id.clone()).collect();
    ids.sort();
    let mut expected = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    for d in &listed {
        assert!(d.tags.is_empty());
    }
    let a_desc = listed.iter().find(|d| d.id == a).unwrap();
    assert_eq!(a_desc.name, format!("{}.png", a));
    assert_eq!(a_desc.size, 4);
    assert_eq!(a_desc.content_type, "image/png");
    let b_desc = listed.iter().find(|d| d.id == b).unwrap();
    assert_eq!(b_desc.content_type, "image/jpeg");

    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        CatalogEvent::MetadataUnavailable { operation: "upload_image", .. }
    )));
}

#[tokio::test]
async fn without_metadata_lookups_report_unavailable() {
    let h = TestHarness::without_metadata();
    let id = h.upload("a.png", b"a", None).await;

    for err in [
        h.catalog.get_image(&id).await.unwrap_err(),
        h.catalog.list_images_by_tag("a").await.unwrap_err(),
        h.catalog.delete_image(&id).await.unwrap_err(),
        h.catalog.attach_tags(&id, &strings(&["a"])).await.unwrap_err(),
        h.catalog.list_tags().await.unwrap_err(),
    ] {
        assert!(matches!(err, CatalogError::MetadataUnavailable(_)), "{err}");
    }
    assert_eq!(h.catalog.metadata_status().await, MetadataStatus::Disabled);
}

#[tokio::test]
async fn closed_pool_falls_back_to_storage_listing() {
    let h = TestHarness::new().await;
    let id = h.upload("a.png", b"abc", Some("t")).await;
    h.metadata().pool().close().await;

    let listed = h.catalog.list_images().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(listed[0].tags.is_empty());

    let err = h.catalog.get_image(&id).await.unwrap_err();
    assert!(matches!(err, CatalogError::MetadataUnavailable(_)));
    assert!(matches!(
        h.catalog.metadata_status().await,
        MetadataStatus::Error(_)
    ));
    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        CatalogEvent::MetadataUnavailable { operation: "list_images", .. }
    )));
}

#[tokio::test]
async fn storage_listing_failure_yields_empty_listing() {
    let h = TestHarness::without_metadata();
    h.upload("a.png", b"a", None).await;
    h.objects.fail_list.store(true, Ordering::SeqCst);

    let listed = h.catalog.list_images().await.unwrap();
    assert!(listed.is_empty());
    assert!(h.observer.events().iter().any(|e| matches!(
        e,
        CatalogEvent::StorageListingFailed { prefix, .. } if prefix == "uploads/"
    )));
}

#[tokio::test]
async fn storage_readiness_checks_the_bucket() {
    let h = TestHarness::new().await;
    assert!(h.catalog.storage_ready().await.unwrap());
    assert_eq!(h.catalog.metadata_status().await, MetadataStatus::Ok);
}
