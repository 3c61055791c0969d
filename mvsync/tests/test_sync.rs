mod common;

use common::{engine, ids, model, slot_bytes, thumbnail, FakeCatalog, BASE};
use mvasset::{Asset, Slot};
use mvhandles::HandleCache;
use mvstore::{AssetStore, SyncState};
use mvsync::{AssetSync, RemoteStatus, SyncContext, SyncError, SyncEvent, SyncSettings};
use std::sync::Arc;
use std::time::Duration;

async fn wait_for(engine: &AssetSync, id: &str) -> bool {
    for _ in 0..100 {
        if engine.asset(id).is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_create_then_list() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;

    let report = engine
        .create_asset(
            Asset::new("", "Chair").with_category("furniture"),
            model("chair.glb", b"glTF-chair"),
        )
        .await
        .unwrap();

    assert_eq!(report.remote, RemoteStatus::Pushed);
    assert!(!report.id.is_empty());

    let listed = engine.list_assets();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Chair");
    assert_eq!(listed[0].file_size, "10 B");
    assert!(listed[0].metadata.created_at.is_some());
    assert!(listed[0]
        .resources
        .model_url
        .as_deref()
        .is_some_and(|u| u.starts_with(BASE)));

    let store = &engine.context().store;
    assert_eq!(store.sync_state(&report.id).await.unwrap(), Some(SyncState::Synced));
    assert_eq!(fake.assets().len(), 1);
}

#[tokio::test]
async fn test_replace_thumbnail_keeps_model() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;

    let files = model("chair.glb", b"glTF-chair").with(Slot::Thumbnail, thumbnail(b"old"));
    let id = engine
        .create_asset(Asset::new("", "Chair"), files)
        .await
        .unwrap()
        .id;

    let report = engine
        .replace_file(&id, Slot::Thumbnail, thumbnail(b"new"))
        .await
        .unwrap();
    assert!(report.remote.is_pushed());

    let stored = engine.context().store.get_payloads(&id).await.unwrap();
    assert_eq!(slot_bytes(&stored, Slot::Model).unwrap(), &b"glTF-chair"[..]);
    assert_eq!(slot_bytes(&stored, Slot::Thumbnail).unwrap(), &b"new"[..]);
    assert_eq!(fake.count_calls("update_files"), 1);
    assert!(fake.remote(&id).unwrap().resources.thumbnail_url.is_some());
}

#[tokio::test]
async fn test_failed_create_is_pushed_once() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;

    fake.go_offline();
    let report = engine
        .create_asset(Asset::new("", "Chair"), model("chair.glb", b"glTF"))
        .await
        .unwrap();
    assert!(matches!(report.remote, RemoteStatus::Unreachable(_)));
    assert!(report.remote.notice().is_some());
    assert!(engine.asset(&report.id).is_some());
    assert_eq!(
        engine.context().store.sync_state(&report.id).await.unwrap(),
        Some(SyncState::PendingCreate)
    );

    fake.go_online();
    let summary = engine.refresh().await.unwrap();
    assert_eq!(summary.pushed, 1);
    assert_eq!(fake.assets().len(), 1);
    assert_eq!(engine.len(), 1);

    engine.refresh().await.unwrap();
    assert_eq!(fake.count_calls("create"), 2);
    assert_eq!(fake.assets().len(), 1);
    assert_eq!(engine.len(), 1);
}

#[tokio::test]
async fn test_bulk_delete_with_partial_failure() {
    let fake = FakeCatalog::new();
    for id in ["a", "b", "c"] {
        fake.seed(id, id, b"glTF");
    }
    let engine = engine(&fake).await;
    assert_eq!(engine.len(), 3);

    fake.refuse_delete_of("b");
    let report = engine.delete_assets(&["a", "b", "c"]).await.unwrap();

    assert_eq!(report.removed_locally, vec!["a", "b", "c"]);
    assert_eq!(report.remote_succeeded, vec!["a", "c"]);
    assert_eq!(report.remote_failed.len(), 1);
    assert_eq!(report.remote_failed[0].0, "b");
    assert!(matches!(
        report.remote_failed[0].1,
        RemoteStatus::Rejected { status: 403, .. }
    ));

    assert!(engine.is_empty());
    assert!(engine.context().store.list_metadata().await.unwrap().is_empty());
    assert_eq!(ids(&fake.assets()), vec!["b"]);

    // Refus définitif : la version distante revient à la synchronisation suivante
    engine.refresh().await.unwrap();
    assert_eq!(ids(&engine.list_assets()), vec!["b"]);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;

    assert!(engine.delete_asset("a").await.unwrap().remote.is_pushed());
    let again = engine.delete_asset("a").await.unwrap();
    assert_eq!(again.remote, RemoteStatus::Skipped);
    assert_eq!(fake.count_calls("delete"), 1);

    let unknown = engine.delete_asset("never-existed").await.unwrap();
    assert_eq!(unknown.remote, RemoteStatus::Skipped);
}

#[tokio::test]
async fn test_disconnected_mode() {
    let engine = AssetSync::start(SyncContext::offline().unwrap()).await.unwrap();
    assert!(engine.is_empty());
    assert!(!engine.context().catalog.is_reachable().await);

    let created = engine
        .create_asset(Asset::new("", "Chair"), model("chair.glb", b"glTF"))
        .await
        .unwrap();
    assert_eq!(created.remote, RemoteStatus::LocalOnly);

    let renamed = engine.rename_asset(&created.id, "Stool").await.unwrap();
    assert_eq!(renamed.remote, RemoteStatus::LocalOnly);
    assert_eq!(engine.asset(&created.id).unwrap().name, "Stool");

    let full = engine.get_asset_full(&created.id, false).await.unwrap().unwrap();
    assert!(full.handles.contains_key(&Slot::Model));
    assert_eq!(full.locator(Slot::Thumbnail), None);

    let summary = engine.refresh().await.unwrap();
    assert_eq!(summary.assets, 1);

    let deleted = engine.delete_asset(&created.id).await.unwrap();
    assert!(!deleted.remote.is_failure());
    assert!(engine.is_empty());
    assert!(engine.context().store.tombstones().await.unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_read_after_write_while_offline() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;
    let store = engine.context().store.clone();

    fake.go_offline();
    let report = engine.rename_asset("a", "Stool").await.unwrap();
    assert!(report.remote.is_failure());
    engine
        .update_tags("a", vec!["wood".into(), " wood ".into(), "Oak".into()])
        .await
        .unwrap();
    engine.update_category("a", "seating").await.unwrap();
    engine.update_rendering_flag("a", true).await.unwrap();

    let local = store.get_metadata("a").await.unwrap().unwrap();
    assert_eq!(local.name, "Stool");
    assert_eq!(local.tags, vec!["wood", "Oak"]);
    assert_eq!(local.category, "seating");
    assert!(local.rendered);
    assert_eq!(engine.asset("a").unwrap(), local);
    assert_eq!(store.sync_state("a").await.unwrap(), Some(SyncState::PendingUpdate));

    // La synchronisation suivante pousse l'état cumulé
    fake.go_online();
    engine.refresh().await.unwrap();
    let remote = fake.remote("a").unwrap();
    assert_eq!(remote.name, "Stool");
    assert_eq!(remote.tags, vec!["wood", "Oak"]);
    assert_eq!(remote.category, "seating");
    assert!(remote.rendered);
    assert_eq!(store.sync_state("a").await.unwrap(), Some(SyncState::Synced));
}

#[tokio::test]
async fn test_startup_falls_back_to_local_store() {
    let store = AssetStore::open_in_memory().unwrap();
    store
        .put_asset(&Asset::new("local-1", "Cached"), &model("x.glb", b"glTF"))
        .await
        .unwrap();

    let fake = FakeCatalog::new();
    fake.go_offline();
    let ctx = SyncContext::new(fake.clone(), store, Arc::new(HandleCache::default()));

    let engine = AssetSync::new(ctx);
    let mut events = engine.subscribe();
    let summary = engine.load().await.unwrap();

    assert_eq!(summary.assets, 1);
    assert_eq!(ids(&engine.list_assets()), vec!["local-1"]);
    assert!(matches!(events.try_recv(), Ok(SyncEvent::SyncFailed { .. })));
    assert!(engine.refresh().await.is_err());
}

#[tokio::test]
async fn test_sync_drops_assets_missing_remotely() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF-a");
    fake.seed("b", "Table", b"glTF-b");
    let engine = engine(&fake).await;

    let full = engine.get_asset_full("a", false).await.unwrap().unwrap();
    let handle = full.handles[&Slot::Model].clone();
    assert!(engine.resolve_handle(handle.as_str()).is_some());

    fake.remove("a");
    let summary = engine.refresh().await.unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(ids(&engine.list_assets()), vec!["b"]);
    assert!(engine.context().store.get_metadata("a").await.unwrap().is_none());
    assert!(engine.resolve_handle(handle.as_str()).is_none());
}

#[tokio::test]
async fn test_get_asset_full_handles() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;

    let files = model("chair.glb", b"glTF").with(Slot::Thumbnail, thumbnail(b"png"));
    let id = engine
        .create_asset(Asset::new("", "Chair"), files)
        .await
        .unwrap()
        .id;

    let first = engine.get_asset_full(&id, false).await.unwrap().unwrap();
    assert_eq!(first.handles.len(), 2);
    let again = engine.get_asset_full(&id, false).await.unwrap().unwrap();
    assert_eq!(first.handles, again.handles);

    let forced = engine.get_asset_full(&id, true).await.unwrap().unwrap();
    let old = &first.handles[&Slot::Model];
    assert_ne!(&forced.handles[&Slot::Model], old);
    assert!(engine.resolve_handle(old.as_str()).is_none());
    assert_eq!(
        engine
            .resolve_handle(forced.handles[&Slot::Model].as_str())
            .unwrap()
            .data,
        &b"glTF"[..]
    );

    assert!(engine.get_asset_full("missing", false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_asset_full_pulls_unknown_asset() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;

    fake.seed("late", "Lamp", b"glTF-lamp");
    let full = engine.get_asset_full("late", false).await.unwrap().unwrap();

    assert_eq!(full.asset.name, "Lamp");
    assert!(full.locator(Slot::Model).unwrap().starts_with("blob:"));
    assert!(engine.asset("late").is_some());

    // Le binaire téléchargé est maintenant en cache
    let cached = engine.context().store.get_payload("late", Slot::Model).await.unwrap();
    assert_eq!(cached.unwrap().data, &b"glTF-lamp"[..]);
}

#[tokio::test]
async fn test_busy_only_for_user_operations() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;
    let mut busy = engine.subscribe_busy();
    assert!(!*busy.borrow_and_update());

    engine.sync().await.unwrap();
    engine.update_tags("a", vec!["wood".into()]).await.unwrap();
    assert!(!busy.has_changed().unwrap());

    engine.rename_asset("a", "Stool").await.unwrap();
    assert!(busy.has_changed().unwrap());
    assert!(!*busy.borrow_and_update());
    assert!(!engine.busy());
}

#[tokio::test]
async fn test_tombstone_retried_until_remote_confirms() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;
    let store = engine.context().store.clone();

    fake.go_offline();
    let report = engine.delete_asset("a").await.unwrap();
    assert!(matches!(report.remote, RemoteStatus::Unreachable(_)));
    assert_eq!(store.tombstones().await.unwrap(), vec!["a"]);
    assert!(engine.refresh().await.is_err());

    fake.go_online();
    engine.refresh().await.unwrap();
    assert!(fake.remote("a").is_none());
    assert!(engine.is_empty());
    assert!(store.tombstones().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_assigned_id_is_adopted() {
    let fake = FakeCatalog::assigning_ids();
    let engine = engine(&fake).await;

    let report = engine
        .create_asset(Asset::new("local-1", "Chair"), model("chair.glb", b"glTF"))
        .await
        .unwrap();
    assert_eq!(report.id, "srv-1");
    assert_eq!(ids(&engine.list_assets()), vec!["srv-1"]);

    let store = &engine.context().store;
    assert!(store.get_metadata("local-1").await.unwrap().is_none());
    assert!(store.get_payloads("srv-1").await.unwrap().contains(Slot::Model));

    engine.refresh().await.unwrap();
    assert_eq!(engine.len(), 1);
    assert_eq!(fake.assets().len(), 1);
}

#[tokio::test]
async fn test_rejected_changes() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;
    let store = engine.context().store.clone();

    // Mise à jour refusée : retirée de la file de poussée
    fake.remove("a");
    let report = engine.rename_asset("a", "Stool").await.unwrap();
    assert!(matches!(report.remote, RemoteStatus::Rejected { status: 404, .. }));
    assert_eq!(store.sync_state("a").await.unwrap(), Some(SyncState::Synced));

    // Création refusée : l'asset reste en attente, une seule entrée dans la liste
    fake.seed("dup", "Remote", b"glTF");
    let report = engine
        .create_asset(Asset::new("dup", "Local"), model("dup.glb", b"glTF"))
        .await
        .unwrap();
    assert!(matches!(report.remote, RemoteStatus::Rejected { status: 409, .. }));
    assert_eq!(store.sync_state("dup").await.unwrap(), Some(SyncState::PendingCreate));

    engine.refresh().await.unwrap();
    let listed: Vec<Asset> = engine.list_assets().into_iter().filter(|a| a.id == "dup").collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Local");
}

#[tokio::test]
async fn test_invalid_operations() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    let engine = engine(&fake).await;

    let no_model = engine
        .create_asset(Asset::new("", "Chair"), Default::default())
        .await;
    assert!(matches!(no_model, Err(SyncError::InvalidInput(_))));

    let duplicate = engine
        .create_asset(Asset::new("a", "Chair"), model("a.glb", b"glTF"))
        .await;
    assert!(matches!(duplicate, Err(SyncError::AlreadyExists(_))));

    assert!(matches!(
        engine.rename_asset("a", "   ").await,
        Err(SyncError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.rename_asset("nope", "Stool").await,
        Err(SyncError::NotFound(_))
    ));
    assert!(matches!(
        engine.replace_file("nope", Slot::Thumbnail, thumbnail(b"png")).await,
        Err(SyncError::NotFound(_))
    ));
    assert!(!engine.busy());
}

#[tokio::test]
async fn test_events_follow_mutations() {
    let fake = FakeCatalog::new();
    let engine = engine(&fake).await;
    let mut events = engine.subscribe();

    let id = engine
        .create_asset(Asset::new("", "Chair"), model("chair.glb", b"glTF"))
        .await
        .unwrap()
        .id;
    engine.delete_asset(&id).await.unwrap();

    assert_eq!(events.try_recv().unwrap(), SyncEvent::AssetChanged { id: id.clone() });
    assert_eq!(events.try_recv().unwrap(), SyncEvent::AssetRemoved { id });
}

#[tokio::test]
async fn test_periodic_sync_picks_up_remote_changes() {
    let fake = FakeCatalog::new();
    let ctx = common::context(&fake).with_settings(SyncSettings {
        interval: Duration::from_millis(50),
        download_payloads: true,
    });
    let engine = AssetSync::start(ctx).await.unwrap();

    fake.seed("late", "Lamp", b"glTF-lamp");
    assert!(wait_for(&engine, "late").await);

    let slots = engine.context().store.payload_slots("late").await.unwrap();
    assert_eq!(slots, vec![Slot::Model]);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_focus_triggers_sync() {
    let fake = FakeCatalog::new();
    let ctx = common::context(&fake).with_settings(SyncSettings {
        interval: Duration::from_secs(3600),
        download_payloads: false,
    });
    let engine = AssetSync::start(ctx).await.unwrap();

    fake.seed("late", "Lamp", b"glTF");
    engine.notify_focus();
    assert!(wait_for(&engine, "late").await);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_sync_leaves_running_create_alone() {
    let fake = FakeCatalog::assigning_ids();
    let engine = engine(&fake).await;
    let gate = fake.hold("create");

    let creating = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .create_asset(Asset::new("a1", "Chair"), model("chair.glb", b"glTF"))
                .await
        }
    });
    gate.reached().await;

    assert!(engine.sync().await.unwrap().is_some());
    assert_eq!(ids(&engine.list_assets()), vec!["a1"]);

    gate.release();
    let report = creating.await.unwrap().unwrap();
    assert_eq!(report.id, "srv-1");
    assert_eq!(report.remote, RemoteStatus::Pushed);
    assert_eq!(fake.count_calls("create"), 1);
    assert_eq!(ids(&fake.assets()), vec!["srv-1"]);

    engine.refresh().await.unwrap();
    assert_eq!(fake.count_calls("create"), 1);
    assert_eq!(ids(&engine.list_assets()), vec!["srv-1"]);
}

#[tokio::test]
async fn test_rename_during_create_follows_it() {
    let fake = FakeCatalog::assigning_ids();
    let engine = engine(&fake).await;
    let store = engine.context().store.clone();
    let gate = fake.hold("create");

    let creating = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .create_asset(Asset::new("a1", "Chair"), model("chair.glb", b"glTF"))
                .await
        }
    });
    gate.reached().await;

    let renamed = engine.rename_asset("a1", "Stool").await.unwrap();
    assert_eq!(renamed.remote, RemoteStatus::Queued);
    assert!(!renamed.remote.is_failure());

    gate.release();
    assert_eq!(creating.await.unwrap().unwrap().id, "srv-1");

    // Une seule création ; le nouveau nom attend la poussée suivante
    assert_eq!(fake.count_calls("create"), 1);
    assert_eq!(fake.remote("srv-1").unwrap().name, "Chair");
    assert_eq!(engine.asset("srv-1").unwrap().name, "Stool");
    assert_eq!(store.sync_state("srv-1").await.unwrap(), Some(SyncState::PendingUpdate));
    assert!(store.get_payloads("srv-1").await.unwrap().contains(Slot::Model));

    engine.refresh().await.unwrap();
    assert_eq!(ids(&fake.assets()), vec!["srv-1"]);
    assert_eq!(fake.remote("srv-1").unwrap().name, "Stool");
    assert_eq!(store.sync_state("srv-1").await.unwrap(), Some(SyncState::Synced));
    assert_eq!(ids(&engine.list_assets()), vec!["srv-1"]);
}

#[tokio::test]
async fn test_edit_of_unaccepted_create_waits_for_it() {
    let fake = FakeCatalog::assigning_ids();
    let engine = engine(&fake).await;

    fake.go_offline();
    let id = engine
        .create_asset(Asset::new("a1", "Chair"), model("chair.glb", b"glTF"))
        .await
        .unwrap()
        .id;
    fake.go_online();

    let renamed = engine.rename_asset(&id, "Stool").await.unwrap();
    assert_eq!(renamed.remote, RemoteStatus::Queued);
    let replaced = engine
        .replace_file(&id, Slot::Thumbnail, thumbnail(b"png"))
        .await
        .unwrap();
    assert_eq!(replaced.remote, RemoteStatus::Queued);
    assert_eq!(fake.count_calls("create"), 1);

    engine.refresh().await.unwrap();
    assert_eq!(fake.count_calls("create"), 2);
    let remote = fake.remote("srv-1").unwrap();
    assert_eq!(remote.name, "Stool");
    assert!(remote.resources.thumbnail_url.is_some());
    assert_eq!(fake.assets().len(), 1);
}

#[tokio::test]
async fn test_delete_during_sync_stays_deleted() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"glTF");
    fake.seed("b", "Table", b"glTF");
    let engine = engine(&fake).await;
    let gate = fake.hold("list");

    let syncing = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync().await }
    });
    gate.reached().await;

    let report = engine.delete_asset("a").await.unwrap();
    assert!(report.remote.is_pushed());

    gate.release();
    assert!(syncing.await.unwrap().unwrap().is_some());

    assert_eq!(ids(&engine.list_assets()), vec!["b"]);
    assert!(engine.context().store.get_metadata("a").await.unwrap().is_none());
    assert!(fake.remote("a").is_none());

    engine.refresh().await.unwrap();
    assert_eq!(ids(&engine.list_assets()), vec!["b"]);
}

#[tokio::test]
async fn test_remote_file_change_revokes_stale_handle() {
    let fake = FakeCatalog::new();
    fake.seed("a", "Chair", b"v1-bytes");
    let engine = engine(&fake).await;

    let first = engine.get_asset_full("a", false).await.unwrap().unwrap();
    let old = first.handles[&Slot::Model].clone();
    assert_eq!(engine.resolve_handle(old.as_str()).unwrap().data, &b"v1-bytes"[..]);

    fake.replace_model("a", b"v2-bytes");
    engine.sync().await.unwrap();
    assert!(engine.resolve_handle(old.as_str()).is_none());

    let second = engine.get_asset_full("a", false).await.unwrap().unwrap();
    let fresh = &second.handles[&Slot::Model];
    assert_ne!(fresh, &old);
    assert_eq!(engine.resolve_handle(fresh.as_str()).unwrap().data, &b"v2-bytes"[..]);
}
