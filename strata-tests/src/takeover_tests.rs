//! Bulk takeover and sanity-check.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use strata_engine::Link;
use strata_store::{ListOptions, ObjectStore};

use crate::support::{Harness, CONTAINER};

const ZERO: Option<Duration> = Some(Duration::ZERO);

const TAKEOVER_MARKER: &str = ".strata internal reserved prefix/need_take_over";

#[tokio::test]
async fn test_takeover_adopts_foreign_far_namespace() {
    let h = Harness::new(ZERO, None).await;
    // Populate the far tier behind the gateway's back.
    for name in ["one", "two", "three"] {
        h.far
            .put(CONTAINER, name, Bytes::from("payload"), BTreeMap::new())
            .await
            .unwrap();
    }

    // Out of sync: the audit reports not sane and arms a takeover.
    assert!(!h.gateway.sanity_check(CONTAINER).await.unwrap());
    assert!(h.near.exists(CONTAINER, TAKEOVER_MARKER).await.unwrap());

    let adopted = h.gateway.take_over(CONTAINER).await.unwrap();
    assert_eq!(adopted, 3);
    assert!(!h.gateway.takeover_in_progress());
    assert!(
        !h.near.exists(CONTAINER, TAKEOVER_MARKER).await.unwrap(),
        "takeover clears the armed marker"
    );

    for name in ["one", "two", "three"] {
        let meta = h.near.raw_meta(CONTAINER, name).unwrap();
        assert!(Link::is_link(&meta), "{name} must be adopted as a link");
    }

    // Converged: the audit now passes.
    assert!(h.gateway.sanity_check(CONTAINER).await.unwrap());
}

#[tokio::test]
async fn test_takeover_leaves_existing_near_objects_alone() {
    let h = Harness::new(ZERO, None).await;
    h.put("mine", b"near payload").await;
    h.far
        .put(CONTAINER, "theirs", Bytes::from("far payload"), BTreeMap::new())
        .await
        .unwrap();

    let adopted = h.gateway.take_over(CONTAINER).await.unwrap();
    assert_eq!(adopted, 1);

    assert!(!h.near_is_link("mine"));
    assert!(h.near_is_link("theirs"));
    assert_eq!(h.get_bytes("theirs").await.unwrap(), Bytes::from("far payload"));
}

#[tokio::test]
async fn test_sanity_check_fails_fast_with_armed_marker() {
    let h = Harness::new(ZERO, None).await;
    h.near
        .put(CONTAINER, TAKEOVER_MARKER, Bytes::new(), BTreeMap::new())
        .await
        .unwrap();

    assert!(!h.gateway.sanity_check(CONTAINER).await.unwrap());
}

#[tokio::test]
async fn test_sanity_check_passes_after_reconciliation() {
    let h = Harness::new(ZERO, None).await;
    h.put("a", b"payload").await;
    h.put("b", b"other payload").await;
    h.reconcile("a").await;
    h.reconcile("b").await;

    assert!(h.gateway.sanity_check(CONTAINER).await.unwrap());
    assert!(!h.near.exists(CONTAINER, TAKEOVER_MARKER).await.unwrap());
}

#[tokio::test]
async fn test_sanity_check_passes_over_evicted_links() {
    let h = Harness::new(None, ZERO).await;
    h.put("blob", b"payload").await;
    h.reconcile("blob").await;
    assert!(h.near_is_link("blob"));

    // The unified view resolves the link to the far copy, so the audit
    // sees matching metadata.
    assert!(h.gateway.sanity_check(CONTAINER).await.unwrap());
}

#[tokio::test]
async fn test_sanity_check_detects_divergent_far_copy() {
    let h = Harness::new(ZERO, None).await;
    h.put("blob", b"payload").await;
    h.reconcile("blob").await;

    // Far copy replaced behind the gateway's back: sizes now differ.
    h.far
        .put(
            CONTAINER,
            "blob",
            Bytes::from("a divergent payload"),
            BTreeMap::new(),
        )
        .await
        .unwrap();

    assert!(!h.gateway.sanity_check(CONTAINER).await.unwrap());
    assert!(h.near.exists(CONTAINER, TAKEOVER_MARKER).await.unwrap());
}

#[tokio::test]
async fn test_takeover_marker_not_listed() {
    let h = Harness::new(ZERO, None).await;
    h.far
        .put(CONTAINER, "obj", Bytes::from("payload"), BTreeMap::new())
        .await
        .unwrap();
    h.gateway.sanity_check(CONTAINER).await.unwrap();
    h.gateway.take_over(CONTAINER).await.unwrap();

    let page = h
        .gateway
        .list(CONTAINER, &ListOptions::default())
        .await
        .unwrap();
    let names: Vec<_> = page.entries.iter().map(|e| e.meta.name.as_str()).collect();
    assert_eq!(names, ["obj"]);
}
