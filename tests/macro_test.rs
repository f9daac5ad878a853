//! Integration tests using the #[nulecule_harness::test] macro

#[allow(unused_imports)] // Used in macro-expanded function signatures
use nulecule_harness::{HarnessError, ObjectKind, TestCase};
use std::time::Duration;

/// Test using the #[nulecule_harness::test] macro
/// The macro automatically:
/// - Builds a session from HARNESS_PROVIDER and friends
/// - Captures the provider baseline and injects it as `case`
/// - Reaps everything the test created, pass or fail
#[nulecule_harness::test]
#[ignore] // Requires a live provider and the nulecule library
async fn test_macro_wordpress_lifecycle(mut case: TestCase) {
    case.answers_mut().set("wordpress", "db_user", "foo");
    case.answers_mut().set("wordpress", "db_pass", "foo");
    case.answers_mut().set("wordpress", "db_name", "foo");

    let workdir = case
        .deploy_app("wordpress-centos7-atomicapp")
        .await
        .expect("Should deploy");

    case.assert_pod("wordpress", Some("Running"), Duration::from_secs(360))
        .await
        .expect("wordpress should be running");
    case.assert_service("wordpress", Duration::from_secs(360))
        .await
        .expect("wordpress service should exist");

    case.undeploy(&workdir).await.expect("Should undeploy");

    case.assert_absent(ObjectKind::Pod, "wordpress", Duration::from_secs(360))
        .await
        .expect("wordpress should be gone");
}

/// Test with a Result return type
#[nulecule_harness::test]
#[ignore] // Requires a live provider
async fn test_macro_with_result(case: TestCase) -> Result<(), HarnessError> {
    let workdir = case.deploy("projectatomic/helloapache").await?;
    case.assert_container_running("helloapache").await?;
    case.undeploy(&workdir).await?;
    Ok(())
}

/// Test without case parameter - should just work as regular async test
#[nulecule_harness::test]
async fn test_macro_without_case() {
    // No case needed - macro just wraps with #[tokio::test]
    let x = 1 + 1;
    assert_eq!(x, 2);
}
