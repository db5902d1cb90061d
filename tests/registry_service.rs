use std::sync::Arc;

use api_registry::error::RegistryError;
use api_registry::service::RegistryService;
use api_registry::storage::memory::MemoryStorage;

fn service() -> RegistryService {
    RegistryService::new(Arc::new(MemoryStorage::new()))
}

async fn seed_version(service: &RegistryService) -> String {
    service
        .create_project("p", "Project".into(), "".into())
        .await
        .unwrap();
    service
        .create_api("projects/p", "a", "Api".into(), "".into())
        .await
        .unwrap();
    service
        .create_api_version(
            "projects/p/locations/global/apis/a",
            "v",
            "Version".into(),
            "".into(),
        )
        .await
        .unwrap();
    "projects/p/locations/global/apis/a/versions/v".to_string()
}

/// S1: tag a deployment revision, then resolve it both by tag and by id.
#[tokio::test]
async fn s1_tag_resolves_to_same_revision_as_by_id() {
    let service = service();
    service.create_project("p", "Project".into(), "".into()).await.unwrap();
    service
        .create_api("projects/p", "a", "Api".into(), "".into())
        .await
        .unwrap();
    service
        .create_api_deployment(
            "projects/p/locations/global/apis/a",
            "d",
            "Deployment".into(),
            "".into(),
            "".into(),
            "https://example.com".into(),
            "".into(),
            "".into(),
            "".into(),
        )
        .await
        .unwrap();

    let name = "projects/p/locations/global/apis/a/deployments/d";
    let r2 = service
        .update_api_deployment(
            name,
            "".into(),
            "".into(),
            "/projects/p/apis/a/versions/v/specs/s@12345678".into(),
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            &[],
            false,
        )
        .await
        .unwrap();

    let tagged = service
        .tag_api_deployment_revision(name, "my-tag")
        .await
        .unwrap();
    assert!(tagged.name.ends_with("@my-tag"));

    let by_id = service
        .get_api_deployment(&format!("{name}@{}", r2.revision_id))
        .await
        .unwrap();
    let by_tag = service.get_api_deployment(&format!("{name}@my-tag")).await.unwrap();

    assert_eq!(by_id.revision_id, by_tag.revision_id);
    assert_eq!(by_id.api_spec_revision, by_tag.api_spec_revision);
    assert!(by_tag.name.ends_with("@my-tag"));
}

/// S2: three revisions of a spec page back newest-first, one per page.
#[tokio::test]
async fn s2_list_revisions_pages_newest_first() {
    let service = service();
    let version = seed_version(&service).await;
    service
        .create_api_spec(
            &version,
            "s",
            "openapi.yaml".into(),
            "".into(),
            "application/yaml".into(),
            "".into(),
            b"A".to_vec(),
        )
        .await
        .unwrap();
    let name = format!("{version}/specs/s");
    let r2 = service
        .update_api_spec(
            &name,
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            Some(b"B".to_vec()),
            &[],
            false,
        )
        .await
        .unwrap();
    let r3 = service
        .update_api_spec(
            &name,
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            Some(b"C".to_vec()),
            &[],
            false,
        )
        .await
        .unwrap();

    let (page1, token1) = service.list_api_spec_revisions(&name, 1, "").await.unwrap();
    assert_eq!(page1.len(), 1);
    assert_eq!(page1[0].revision_id, r3.revision_id);
    assert_eq!(page1[0].name, format!("{name}@{}", r3.revision_id));
    assert!(!token1.is_empty());

    let (page2, token2) = service.list_api_spec_revisions(&name, 1, &token1).await.unwrap();
    assert_eq!(page2[0].revision_id, r2.revision_id);
    assert_eq!(page2[0].name, format!("{name}@{}", r2.revision_id));
    assert!(!token2.is_empty());

    let (page3, token3) = service.list_api_spec_revisions(&name, 1, &token2).await.unwrap();
    assert_eq!(page3.len(), 1);
    assert!(token3.is_empty());
}

/// S3: rolling back to the first revision mints a fresh id carrying the old content.
#[tokio::test]
async fn s3_rollback_mints_fresh_revision_and_becomes_current() {
    let service = service();
    let version = seed_version(&service).await;
    let r1 = service
        .create_api_spec(
            &version,
            "s",
            "openapi.yaml".into(),
            "".into(),
            "application/yaml".into(),
            "".into(),
            b"A".to_vec(),
        )
        .await
        .unwrap();
    let name = format!("{version}/specs/s");
    service
        .update_api_spec(&name, "".into(), "".into(), "".into(), "".into(), Some(b"B".to_vec()), &[], false)
        .await
        .unwrap();

    let r4 = service.rollback_api_spec(&name, &r1.revision_id).await.unwrap();
    assert_ne!(r4.revision_id, r1.revision_id);
    assert_eq!(r4.contents, b"A");
    assert_eq!(r4.name, format!("{name}@{}", r4.revision_id));

    let current = service.get_api_spec(&name).await.unwrap();
    assert_eq!(current.revision_id, r4.revision_id);

    let (revisions, _) = service.list_api_spec_revisions(&name, 10, "").await.unwrap();
    assert_eq!(revisions[0].revision_id, r4.revision_id);
    assert_eq!(revisions[0].name, format!("{name}@{}", r4.revision_id));
}

/// S4: deleting one revision makes it and its tags unreachable.
#[tokio::test]
async fn s4_delete_revision_removes_it_and_its_tags() {
    let service = service();
    let version = seed_version(&service).await;
    service
        .create_api_spec(&version, "s", "openapi.yaml".into(), "".into(), "application/yaml".into(), "".into(), b"A".to_vec())
        .await
        .unwrap();
    let name = format!("{version}/specs/s");
    let r2 = service
        .update_api_spec(&name, "".into(), "".into(), "".into(), "".into(), Some(b"B".to_vec()), &[], false)
        .await
        .unwrap();
    service.tag_api_spec_revision(&format!("{name}@{}", r2.revision_id), "latest").await.unwrap();
    service
        .update_api_spec(&name, "".into(), "".into(), "".into(), "".into(), Some(b"C".to_vec()), &[], false)
        .await
        .unwrap();

    service
        .delete_api_spec_revision(&format!("{name}@{}", r2.revision_id))
        .await
        .unwrap();

    let err = service.get_api_spec(&format!("{name}@{}", r2.revision_id)).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));

    let err = service.get_api_spec(&format!("{name}@latest")).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

/// S5: deleting the only remaining revision is rejected and leaves it intact.
#[tokio::test]
async fn s5_delete_last_revision_is_rejected() {
    let service = service();
    let version = seed_version(&service).await;
    let r1 = service
        .create_api_spec(&version, "s", "openapi.yaml".into(), "".into(), "application/yaml".into(), "".into(), b"A".to_vec())
        .await
        .unwrap();
    let name = format!("{version}/specs/s");

    let err = service
        .delete_api_spec_revision(&format!("{name}@{}", r1.revision_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::FailedPrecondition(_)));

    let still_there = service.get_api_spec(&format!("{name}@{}", r1.revision_id)).await.unwrap();
    assert_eq!(still_there.revision_id, r1.revision_id);
}

/// S6: updating a pinned-revision name is rejected without mutating state.
#[tokio::test]
async fn s6_update_targeting_pinned_revision_is_rejected() {
    let service = service();
    let version = seed_version(&service).await;
    let r1 = service
        .create_api_spec(&version, "s", "openapi.yaml".into(), "".into(), "application/yaml".into(), "".into(), b"A".to_vec())
        .await
        .unwrap();
    let name = format!("{version}/specs/s");

    let err = service
        .update_api_spec(
            &format!("{name}@{}", r1.revision_id),
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            Some(b"B".to_vec()),
            &[],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));

    let unchanged = service.get_api_spec(&name).await.unwrap();
    assert_eq!(unchanged.revision_id, r1.revision_id);
    assert_eq!(unchanged.contents, b"A");
}

/// P6: deleting a project makes every descendant unreachable.
#[tokio::test]
async fn p6_cascade_delete_hides_every_descendant() {
    let service = service();
    let version = seed_version(&service).await;
    service
        .create_api_spec(&version, "s", "openapi.yaml".into(), "".into(), "application/yaml".into(), "".into(), b"A".to_vec())
        .await
        .unwrap();
    service
        .create_api_deployment(
            "projects/p/locations/global/apis/a",
            "d",
            "Deployment".into(),
            "".into(),
            "".into(),
            "https://example.com".into(),
            "".into(),
            "".into(),
            "".into(),
        )
        .await
        .unwrap();
    service
        .create_artifact("projects/p", "readme", "text/plain".into(), b"hello".to_vec())
        .await
        .unwrap();

    service.delete_project("projects/p").await.unwrap();

    assert!(matches!(
        service.get_project("projects/p").await.unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert!(matches!(
        service.get_api("projects/p/locations/global/apis/a").await.unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert!(matches!(
        service.get_api_version(&version).await.unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert!(matches!(
        service.get_api_spec(&format!("{version}/specs/s")).await.unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert!(matches!(
        service
            .get_api_deployment("projects/p/locations/global/apis/a/deployments/d")
            .await
            .unwrap_err(),
        RegistryError::NotFound(_)
    ));
    assert!(matches!(
        service.get_artifact("projects/p/artifacts/readme").await.unwrap_err(),
        RegistryError::NotFound(_)
    ));

    let (apis, _) = service.list_apis("projects/p", 10, "", "").await.unwrap();
    assert!(apis.is_empty());
}

/// P7: concatenating every page for a fixed shape reproduces the unpaged
/// listing, in order, with no duplicates.
#[tokio::test]
async fn p7_pagination_concatenates_to_the_unpaged_listing() {
    let service = service();
    service.create_project("p", "Project".into(), "".into()).await.unwrap();
    for id in ["a1", "a2", "a3", "a4", "a5"] {
        service
            .create_api("projects/p", id, id.to_string(), "".into())
            .await
            .unwrap();
    }

    let (all, _) = service.list_apis("projects/p", 100, "", "").await.unwrap();
    assert_eq!(all.len(), 5);

    let mut paged = Vec::new();
    let mut token = String::new();
    loop {
        let (page, next) = service.list_apis("projects/p", 2, &token, "").await.unwrap();
        if page.is_empty() {
            break;
        }
        paged.extend(page);
        if next.is_empty() {
            break;
        }
        token = next;
    }

    assert_eq!(paged.len(), all.len());
    for (a, b) in all.iter().zip(paged.iter()) {
        assert_eq!(a.name, b.name);
    }
}

/// Artifacts attach under any resource kind and are not revisioned: a
/// replace overwrites the single row's hash and size in place.
#[tokio::test]
async fn artifact_replace_rederives_hash_and_size() {
    let service = service();
    service.create_project("p", "Project".into(), "".into()).await.unwrap();
    let created = service
        .create_artifact("projects/p", "logo", "image/png".into(), b"first".to_vec())
        .await
        .unwrap();

    let replaced = service
        .update_artifact("projects/p/artifacts/logo", "image/png".into(), Some(b"second!".to_vec()), &[])
        .await
        .unwrap();

    assert_ne!(created.hash, replaced.hash);
    assert_eq!(replaced.size_bytes, "second!".len() as i64);
}

/// A name malformed at any level is rejected with InvalidArgument before any
/// storage access is attempted.
#[tokio::test]
async fn malformed_name_is_rejected() {
    let service = service();
    let err = service.get_project("Projects/p").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));

    let err = service.get_api_spec("projects/p/specs/s").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));
}

/// Listing a project's apis must not surface grandchildren (versions).
#[tokio::test]
async fn list_does_not_surface_grandchildren() {
    let service = service();
    let version = seed_version(&service).await;
    let _ = version;

    let (apis, _) = service.list_apis("projects/p", 10, "", "").await.unwrap();
    assert_eq!(apis.len(), 1);
    assert_eq!(apis[0].name, "projects/p/locations/global/apis/a");

    let (projects, _) = service.list_projects(10, "", "").await.unwrap();
    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn malformed_revision_reference_is_rejected() {
    let service = service();
    let version = seed_version(&service).await;
    let name = format!("{version}/specs/s@Not_Valid!");
    let err = service.get_api_spec(&name).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));
}
