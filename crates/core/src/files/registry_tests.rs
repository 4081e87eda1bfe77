use super::*;
use crate::files::memory::InMemoryFileRepository;
use crate::files::test_support::{FlakyStorage, PNG, body, new_record, read_all};
use crate::files::types::OwnerType;
use crate::storage::{PutOptions, Visibility};
use filestore_shared::types::OwnerId;

struct Harness {
    repo: Arc<InMemoryFileRepository>,
    storage: Arc<FlakyStorage>,
    registry: OwnershipRegistry<InMemoryFileRepository, FlakyStorage>,
}

fn harness_with(storage: FlakyStorage) -> Harness {
    let repo = Arc::new(InMemoryFileRepository::new());
    let storage = Arc::new(storage);
    let registry = OwnershipRegistry::new(
        Arc::clone(&repo),
        Arc::clone(&storage),
        Duration::from_secs(60),
    );
    Harness {
        repo,
        storage,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(FlakyStorage::new())
}

fn profile(owner: OwnerId) -> Owner {
    Owner::new(OwnerType::Profile, owner)
}

/// Insert a record and write its blob.
async fn stored_file(h: &Harness, tenant: TenantId) -> FileId {
    let record = h.repo.insert(new_record(tenant, PNG.len() as u64)).await.unwrap();
    h.storage
        .put(
            body(PNG),
            &record.storage_key,
            PutOptions {
                content_type: "image/png".to_string(),
                size_hint: None,
                visibility: Visibility::Private,
                bucket: None,
            },
        )
        .await
        .unwrap();
    record.id
}

#[tokio::test]
async fn test_attach_sets_owner() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    let owner = profile(OwnerId::new());

    let record = h.registry.attach(tenant, id, owner).await.unwrap();

    assert_eq!(record.status, FileStatus::Attached);
    assert_eq!(record.owner, Some(owner));
    assert!(record.attached_at.is_some());
    assert!(h.registry.is_attached(tenant, id).await.unwrap());
}

#[tokio::test]
async fn test_attach_twice_conflicts_without_overwrite() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    let first = profile(OwnerId::new());

    h.registry.attach(tenant, id, first).await.unwrap();
    let err = h
        .registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FileError::Conflict {
            status: FileStatus::Attached,
            ..
        }
    ));
    assert_eq!(h.repo.get(id).unwrap().owner, Some(first));
}

#[tokio::test]
async fn test_concurrent_attach_has_one_winner() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;

    let (a, b) = tokio::join!(
        h.registry.attach(tenant, id, profile(OwnerId::new())),
        h.registry.attach(tenant, id, profile(OwnerId::new())),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(FileError::Conflict { .. })))
    );
}

#[tokio::test]
async fn test_attach_unknown_or_foreign_file_is_not_found() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;

    let err = h
        .registry
        .attach(TenantId::new(), id, profile(OwnerId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));

    let err = h
        .registry
        .attach(tenant, FileId::new(), profile(OwnerId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));
}

#[tokio::test]
async fn test_detach_clears_owner() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();

    h.registry.detach(tenant, id).await.unwrap();

    let record = h.repo.get(id).unwrap();
    assert_eq!(record.status, FileStatus::Uploaded);
    assert!(record.owner.is_none());
    assert!(record.attached_at.is_none());
}

#[tokio::test]
async fn test_detach_requires_attached() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;

    let err = h.registry.detach(tenant, id).await.unwrap_err();
    assert!(matches!(
        err,
        FileError::Conflict {
            status: FileStatus::Uploaded,
            ..
        }
    ));
}

#[tokio::test]
async fn test_mark_for_deletion() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();

    h.registry.mark_for_deletion(tenant, id).await.unwrap();

    let record = h.repo.get(id).unwrap();
    assert_eq!(record.status, FileStatus::Deleting);
    assert!(record.deleted_at.is_some());

    let err = h.registry.mark_for_deletion(tenant, id).await.unwrap_err();
    assert!(matches!(
        err,
        FileError::Conflict {
            status: FileStatus::Deleting,
            ..
        }
    ));
    let err = h
        .registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Conflict { .. }));
}

#[tokio::test]
async fn test_delete_by_owner_counts_exactly() {
    let h = harness();
    let tenant = TenantId::new();
    let owner = profile(OwnerId::new());
    let other = profile(OwnerId::new());

    for _ in 0..3 {
        let id = stored_file(&h, tenant).await;
        h.registry.attach(tenant, id, owner).await.unwrap();
    }
    let unrelated = stored_file(&h, tenant).await;
    h.registry.attach(tenant, unrelated, other).await.unwrap();
    let loose = stored_file(&h, tenant).await;

    assert_eq!(h.registry.delete_by_owner(tenant, owner).await.unwrap(), 3);
    assert_eq!(h.registry.delete_by_owner(tenant, owner).await.unwrap(), 0);
    assert!(h.registry.find_by_owner(tenant, owner).await.unwrap().is_empty());
    assert_eq!(h.repo.get(unrelated).unwrap().status, FileStatus::Attached);
    assert_eq!(h.repo.get(loose).unwrap().status, FileStatus::Uploaded);
}

#[tokio::test]
async fn test_read_streams_attached_file() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();

    let result = h
        .registry
        .read(tenant, id, ReadOptions::default())
        .await
        .unwrap();

    match result {
        ReadResult::Stream {
            body,
            content_type,
            size,
        } => {
            assert_eq!(content_type, "image/png");
            assert_eq!(size, PNG.len() as u64);
            assert_eq!(read_all(body).await, PNG);
        }
        other => panic!("expected stream, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_hides_unattached_and_foreign_files() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;

    let err = h
        .registry
        .read(tenant, id, ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));

    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();
    let err = h
        .registry
        .read(TenantId::new(), id, ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));

    h.registry.mark_for_deletion(tenant, id).await.unwrap();
    let err = h
        .registry
        .read(tenant, id, ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));
}

#[tokio::test]
async fn test_read_prefers_redirect_when_supported() {
    let h = harness_with(FlakyStorage::with_redirect("https://cdn.example"));
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();

    let result = h
        .registry
        .read(
            tenant,
            id,
            ReadOptions {
                prefer_redirect: true,
            },
        )
        .await
        .unwrap();

    assert!(matches!(result, ReadResult::Redirect { ref url, .. } if url.starts_with("https://cdn.example/")));
}

#[tokio::test]
async fn test_redirect_failure_falls_back_to_stream() {
    let h = harness_with(FlakyStorage::with_redirect("error"));
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, id, profile(OwnerId::new()))
        .await
        .unwrap();

    let result = h
        .registry
        .read(
            tenant,
            id,
            ReadOptions {
                prefer_redirect: true,
            },
        )
        .await
        .unwrap();

    assert!(matches!(result, ReadResult::Stream { .. }));
}

#[tokio::test]
async fn test_read_missing_blob_is_not_found() {
    let h = harness();
    let tenant = TenantId::new();
    let record = h.repo.insert(new_record(tenant, 10)).await.unwrap();
    h.registry
        .attach(tenant, record.id, profile(OwnerId::new()))
        .await
        .unwrap();

    let err = h
        .registry
        .read(tenant, record.id, ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));
}

#[tokio::test]
async fn test_usage_groups_by_status_and_owner() {
    let h = harness();
    let tenant = TenantId::new();
    let attached = stored_file(&h, tenant).await;
    h.registry
        .attach(tenant, attached, profile(OwnerId::new()))
        .await
        .unwrap();
    stored_file(&h, tenant).await;
    stored_file(&h, TenantId::new()).await;

    let usage = h.registry.usage(tenant).await.unwrap();

    assert_eq!(usage.total_files, 2);
    assert_eq!(usage.total_size, 2 * PNG.len() as u64);
    assert_eq!(usage.by_status.get(&FileStatus::Attached), Some(&1));
    assert_eq!(usage.by_status.get(&FileStatus::Uploaded), Some(&1));
    assert_eq!(usage.by_owner_type.get(&OwnerType::Profile), Some(&1));
}

#[tokio::test]
async fn test_get_metadata_and_list() {
    let h = harness();
    let tenant = TenantId::new();
    let id = stored_file(&h, tenant).await;
    stored_file(&h, tenant).await;

    let record = h.registry.get_metadata(tenant, id).await.unwrap();
    assert_eq!(record.id, id);
    assert!(matches!(
        h.registry.get_metadata(TenantId::new(), id).await,
        Err(FileError::NotFound(_))
    ));

    let filter = ListFilter {
        limit: Some(1),
        ..Default::default()
    };
    assert_eq!(h.registry.list(tenant, &filter).await.unwrap().len(), 1);
    assert_eq!(
        h.registry
            .list(tenant, &ListFilter::default())
            .await
            .unwrap()
            .len(),
        2
    );
}
