use std::sync::{Arc, Mutex};

use press_migrate_core::config::MigrateConfig;
use press_migrate_core::contract::{MapStore, MockDestinationWriter, MockMapStore, MockSourceReader};
use press_migrate_core::error::{MigrateError, WriteError};
use press_migrate_core::identity_map::{IdentityMap, JsonMapStore, MapKind};
use press_migrate_core::migrate::{Migrator, Phase};
use press_migrate_core::source::{Family, SourceEntity, SourceId};
use serde_json::Value;
use tempfile::tempdir;

fn test_config(state_dir: &std::path::Path) -> MigrateConfig {
    MigrateConfig {
        batch_size: 2,
        batch_delay_ms: 0,
        ..MigrateConfig::new(state_dir)
    }
}

fn post(id: SourceId, title: &str) -> SourceEntity {
    SourceEntity {
        slug: title.to_lowercase(),
        body: Some(format!("<p>{title} body</p>")),
        ..SourceEntity::new(id, title)
    }
}

fn page(id: SourceId, parent: SourceId, body: &str) -> SourceEntity {
    SourceEntity {
        parent: Some(parent),
        body: Some(body.to_string()),
        ..SourceEntity::new(id, format!("Page {id}"))
    }
}

fn media(id: SourceId) -> SourceEntity {
    SourceEntity {
        source_url: Some(format!("https://blog.test/wp-content/uploads/img-{id}.jpg")),
        mime_type: Some("image/jpeg".into()),
        alt_text: Some(format!("alt {id}")),
        ..SourceEntity::new(id, format!("Image {id}"))
    }
}

fn title_of(fields: &Value) -> String {
    fields["title"]["en-US"]
        .as_str()
        .or_else(|| fields["name"]["en-US"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// A writer that accepts everything and records every `fields` object it sees.
fn recording_writer(seen: Arc<Mutex<Vec<(String, Value)>>>) -> MockDestinationWriter {
    let mut writer = MockDestinationWriter::new();
    writer.expect_create_entity().returning(move |content_type, fields| {
        let id = format!("{content_type}-{}", title_of(&fields));
        seen.lock().unwrap().push((content_type.to_string(), fields));
        Ok(id)
    });
    writer.expect_publish().returning(|_| Ok(()));
    let mut uploads = 0;
    writer.expect_create_asset().returning(move |_| {
        uploads += 1;
        Ok(format!("asset-{uploads}"))
    });
    writer.expect_wait_until_processed().returning(|_| Ok(()));
    writer.expect_publish_asset().returning(|_| Ok(()));
    writer
}

fn snapshot(family: Family) -> Vec<SourceEntity> {
    match family {
        Family::Media => vec![media(100), media(101)],
        Family::Authors => vec![SourceEntity {
            slug: "ada".into(),
            ..SourceEntity::new(1, "Ada")
        }],
        Family::Tags => vec![SourceEntity::new(5, "Rust")],
        Family::Categories => vec![SourceEntity::new(8, "News")],
        Family::Posts => vec![SourceEntity {
            author: Some(1),
            tags: vec![5],
            categories: vec![8],
            featured_media: Some(100),
            body: Some(r#"<p>See <a href="/?page_id=20">about</a></p><img class="wp-image-101" src="/x.jpg">"#.into()),
            ..SourceEntity::new(10, "Hello")
        }],
        Family::Pages => vec![page(20, 0, r#"<p>Back to <a href="/?p=10">hello</a></p>"#)],
    }
}

fn snapshot_reader() -> MockSourceReader {
    let mut reader = MockSourceReader::new();
    reader
        .expect_list_entities()
        .returning(|family| Ok(snapshot(family)));
    reader
        .expect_fetch_media()
        .returning(|_| Ok(vec![0xff, 0xd8, 0xff]));
    reader
}

#[tokio::test]
async fn failed_entities_are_counted_and_left_out_of_the_map() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());
    let reader = MockSourceReader::new();

    let mut writer = MockDestinationWriter::new();
    writer
        .expect_create_entity()
        .times(3)
        .returning(|_, fields| match title_of(&fields).as_str() {
            "Broken" => Err(WriteError::Rejected("validation failed".into())),
            title => Ok(format!("entry-{title}")),
        });
    writer.expect_publish().times(2).returning(|_| Ok(()));

    let migrator = Migrator::new(&reader, &writer, &store, &config);
    let mut maps = IdentityMap::new();
    let stats = migrator
        .migrate_family(
            Family::Posts,
            vec![post(3, "Three"), post(2, "Broken"), post(1, "One")],
            &mut maps,
        )
        .await
        .unwrap();

    assert_eq!(stats.total, 3);
    assert_eq!(stats.migrated, 2);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures[0].source_id, 2);
    assert!(stats.failures[0].message.contains("validation failed"));

    assert_eq!(maps.get(Family::Posts, 1), Some("entry-One"));
    assert!(!maps.contains(Family::Posts, 2));

    let persisted = store.load(MapKind::Entries).unwrap().unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted.get("post:3").map(String::as_str), Some("entry-Three"));
}

#[tokio::test]
async fn publish_failure_counts_as_failed_without_mapping() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());
    let reader = MockSourceReader::new();

    let mut writer = MockDestinationWriter::new();
    writer
        .expect_create_entity()
        .returning(|_, _| Ok("draft-1".to_string()));
    writer
        .expect_publish()
        .returning(|_| Err(WriteError::Rejected("missing required field".into())));

    let migrator = Migrator::new(&reader, &writer, &store, &config);
    let mut maps = IdentityMap::new();
    let stats = migrator
        .migrate_family(Family::Tags, vec![SourceEntity::new(1, "Rust")], &mut maps)
        .await
        .unwrap();

    assert_eq!((stats.migrated, stats.failed), (0, 1));
    assert!(maps.is_empty());
}

#[tokio::test]
async fn second_run_skips_everything_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());
    let reader = snapshot_reader();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = recording_writer(seen.clone());
    let first = Migrator::new(&reader, &writer, &store, &config)
        .run(Phase::All)
        .await
        .unwrap();
    for stats in &first.families {
        assert_eq!(stats.failed, 0, "{:?}", stats.failures);
        assert_eq!(stats.migrated, stats.total);
    }

    let mut idle = MockDestinationWriter::new();
    idle.expect_create_entity().never();
    idle.expect_publish().never();
    idle.expect_create_asset().never();
    idle.expect_wait_until_processed().never();
    idle.expect_publish_asset().never();

    let second = Migrator::new(&reader, &idle, &store, &config)
        .run(Phase::All)
        .await
        .unwrap();
    assert_ne!(first.run_id, second.run_id);
    for stats in &second.families {
        assert_eq!(stats.migrated, 0);
        assert_eq!(stats.skipped, stats.total);
    }
    assert_eq!(second.family(Family::Media).map(|s| s.skipped), Some(2));
}

#[tokio::test]
async fn full_run_resolves_references_in_dependency_order() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());
    let reader = snapshot_reader();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = recording_writer(seen.clone());

    let report = Migrator::new(&reader, &writer, &store, &config)
        .run(Phase::All)
        .await
        .unwrap();

    let order: Vec<Family> = report.families.iter().map(|s| s.family).collect();
    assert_eq!(
        order,
        vec![
            Family::Media,
            Family::Authors,
            Family::Tags,
            Family::Categories,
            Family::Posts,
            Family::Pages
        ]
    );

    let seen = seen.lock().unwrap();
    let types: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(types, vec!["author", "tag", "category", "blogPost", "page"]);

    let post = &seen[3].1;
    assert_eq!(post["author"]["en-US"]["sys"]["id"], "author-Ada");
    assert_eq!(post["tags"]["en-US"][0]["sys"]["id"], "tag-Rust");
    assert_eq!(post["categories"]["en-US"][0]["sys"]["id"], "category-News");
    assert_eq!(post["featuredImage"]["en-US"]["sys"]["linkType"], "Asset");

    // The post links to a page that does not exist yet: it stays external.
    let body = &post["body"]["en-US"];
    assert_eq!(body["content"][0]["content"][1]["nodeType"], "hyperlink");
    assert_eq!(body["content"][1]["nodeType"], "embedded-asset-block");

    // The page links back to the already-migrated post.
    let page_body = &seen[4].1["body"]["en-US"];
    let link = &page_body["content"][0]["content"][1];
    assert_eq!(link["nodeType"], "entry-hyperlink");
    assert_eq!(link["data"]["target"]["sys"]["id"], "blogPost-Hello");
}

#[tokio::test]
async fn content_phase_requires_an_asset_map() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());

    let mut reader = MockSourceReader::new();
    reader.expect_list_entities().never();
    let mut writer = MockDestinationWriter::new();
    writer.expect_create_entity().never();

    let err = Migrator::new(&reader, &writer, &store, &config)
        .run(Phase::Content)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::MissingAssetMap(path) if path == dir.path()));
}

#[tokio::test]
async fn asset_phase_alone_produces_the_asset_map_even_with_no_media() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());

    let mut reader = MockSourceReader::new();
    reader
        .expect_list_entities()
        .times(1)
        .returning(|_| Ok(Vec::new()));
    let writer = MockDestinationWriter::new();

    let report = Migrator::new(&reader, &writer, &store, &config)
        .run(Phase::Assets)
        .await
        .unwrap();
    assert_eq!(report.families.len(), 1);
    assert_eq!(report.families[0].total, 0);
    assert!(store.path(MapKind::Assets).exists());
    assert!(!store.path(MapKind::Entries).exists());
}

#[tokio::test]
async fn unprocessed_asset_is_a_failure_not_a_crash() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());

    let mut reader = MockSourceReader::new();
    reader.expect_fetch_media().returning(|_| Ok(vec![1, 2, 3]));

    let mut writer = MockDestinationWriter::new();
    writer.expect_create_asset().returning(|asset| {
        assert_eq!(asset.content_type, "image/jpeg");
        assert!(asset.file_name.starts_with("img-"));
        Ok(asset.file_name.clone())
    });
    writer.expect_wait_until_processed().returning(|id| {
        if id == "img-2.jpg" {
            Err(WriteError::ProcessingTimeout {
                asset_id: id.to_string(),
                attempts: 10,
            })
        } else {
            Ok(())
        }
    });
    writer.expect_publish_asset().times(2).returning(|_| Ok(()));

    let mut no_url = media(4);
    no_url.source_url = None;

    let migrator = Migrator::new(&reader, &writer, &store, &config);
    let mut maps = IdentityMap::new();
    let stats = migrator
        .migrate_family(
            Family::Media,
            vec![media(1), media(2), media(3), no_url],
            &mut maps,
        )
        .await
        .unwrap();

    assert_eq!((stats.migrated, stats.failed), (2, 2));
    let failed: Vec<SourceId> = stats.failures.iter().map(|f| f.source_id).collect();
    assert!(failed.contains(&2) && failed.contains(&4));
    assert!(stats
        .failures
        .iter()
        .any(|f| f.message.contains("still processing after 10 attempts")));
    assert_eq!(maps.asset(1), Some("img-1.jpg"));
    assert_eq!(maps.asset(2), None);
}

#[tokio::test]
async fn child_pages_link_to_parents_created_earlier_in_the_run() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = MigrateConfig {
        batch_size: 10,
        ..test_config(dir.path())
    };
    let reader = MockSourceReader::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = recording_writer(seen.clone());

    let migrator = Migrator::new(&reader, &writer, &store, &config);
    let mut maps = IdentityMap::new();
    let stats = migrator
        .migrate_family(
            Family::Pages,
            vec![page(3, 2, "<p>c</p>"), page(2, 1, "<p>b</p>"), page(1, 0, "<p>a</p>")],
            &mut maps,
        )
        .await
        .unwrap();
    assert_eq!(stats.migrated, 3);

    let seen = seen.lock().unwrap();
    let titles: Vec<String> = seen.iter().map(|(_, f)| title_of(f)).collect();
    assert_eq!(titles, vec!["Page 1", "Page 2", "Page 3"]);
    assert!(seen[0].1.get("parentPage").is_none());
    assert_eq!(seen[1].1["parentPage"]["en-US"]["sys"]["id"], "page-Page 1");
    assert_eq!(seen[2].1["parentPage"]["en-US"]["sys"]["id"], "page-Page 2");
}

#[tokio::test]
async fn source_listing_failure_aborts_the_run() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());

    let mut reader = MockSourceReader::new();
    reader
        .expect_list_entities()
        .returning(|_| Err("connection refused".into()));
    let writer = MockDestinationWriter::new();

    let err = Migrator::new(&reader, &writer, &store, &config)
        .run(Phase::Assets)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::SourceRead { family: Family::Media, .. }));
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn resumes_from_a_previously_saved_map() {
    let dir = tempdir().unwrap();
    let store = JsonMapStore::new(dir.path());
    let config = test_config(dir.path());

    let mut earlier = IdentityMap::new();
    earlier.insert(Family::Posts, 1, "entry-One");
    store
        .save(MapKind::Entries, earlier.mapping(MapKind::Entries))
        .unwrap();

    let reader = MockSourceReader::new();
    let mut writer = MockDestinationWriter::new();
    writer
        .expect_create_entity()
        .times(1)
        .returning(|_, fields| Ok(format!("entry-{}", title_of(&fields))));
    writer.expect_publish().times(1).returning(|_| Ok(()));

    let mut maps = store.load_all().unwrap();
    let stats = Migrator::new(&reader, &writer, &store, &config)
        .migrate_family(Family::Posts, vec![post(1, "One"), post(2, "Two")], &mut maps)
        .await
        .unwrap();

    assert_eq!((stats.skipped, stats.migrated), (1, 1));
    assert_eq!(store.load_all().unwrap().len(MapKind::Entries), 2);
}

#[tokio::test]
async fn map_is_saved_after_every_batch() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let reader = MockSourceReader::new();
    let writer = recording_writer(Arc::new(Mutex::new(Vec::new())));

    let saved_sizes = Arc::new(Mutex::new(Vec::new()));
    let sizes = saved_sizes.clone();
    let mut store = MockMapStore::new();
    store
        .expect_save()
        .withf(|kind, _| *kind == MapKind::Entries)
        .times(3)
        .returning(move |_, mapping| {
            sizes.lock().unwrap().push(mapping.len());
            Ok(())
        });

    let posts = (1..=5).map(|id| post(id, &format!("Post {id}"))).collect();
    let mut maps = IdentityMap::new();
    let stats = Migrator::new(&reader, &writer, &store, &config)
        .migrate_family(Family::Posts, posts, &mut maps)
        .await
        .unwrap();

    assert_eq!(stats.migrated, 5);
    assert_eq!(*saved_sizes.lock().unwrap(), vec![2, 4, 5]);
}

#[tokio::test]
async fn failed_save_stops_the_family_and_keeps_earlier_batches() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let reader = MockSourceReader::new();
    let writer = recording_writer(Arc::new(Mutex::new(Vec::new())));

    let disk = JsonMapStore::new(dir.path());
    let inner = JsonMapStore::new(dir.path());
    let full_path = inner.path(MapKind::Entries);
    let mut saves = 0;
    let mut store = MockMapStore::new();
    store.expect_save().returning(move |kind, mapping| {
        saves += 1;
        if saves == 1 {
            return inner.save(kind, mapping);
        }
        Err(MigrateError::Persist {
            path: full_path.clone(),
            source: std::io::Error::other("disk full"),
        })
    });

    let posts = (1..=5).map(|id| post(id, &format!("Post {id}"))).collect();
    let mut maps = IdentityMap::new();
    let err = Migrator::new(&reader, &writer, &store, &config)
        .migrate_family(Family::Posts, posts, &mut maps)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Persist { .. }));
    assert!(err.to_string().contains("disk full"));

    let on_disk = disk.load_all().unwrap();
    assert_eq!(on_disk.len(MapKind::Entries), 2);
    assert!(on_disk.contains(Family::Posts, 1));
    assert!(on_disk.contains(Family::Posts, 2));
    assert!(!on_disk.contains(Family::Posts, 3));
}
