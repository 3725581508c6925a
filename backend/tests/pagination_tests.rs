//! Document listing tests
//!
//! Tests for paginated document search including:
//! - Property 8: Keyset traversal visits the same rows as offset pages
//! - Property 9: List totals agree with single-document totals

mod common;

use common::*;
use proptest::prelude::*;
use shared::{DocumentFilter, DocumentKind, DocumentStatus, KeysetCursor};

/// Create `count` imports with varying lines.
///
/// Every third one is approved and every second one is filed at the branch
/// store.
async fn seed_imports(harness: &Harness, count: i64) -> Vec<i64> {
    let documents = harness.documents();
    let mut ids = Vec::new();
    for i in 0..count {
        let mut input = import_input(vec![
            line(1, i + 1, "10.5", Some("7.5")),
            line(2, 3, "99.99", None),
        ]);
        input.code = Some(format!("IMP-{:03}", i));
        input.store_id = Some(if i % 2 == 1 { BRANCH_STORE } else { MAIN_STORE });
        let created = documents.create(DocumentKind::Import, input, CLERK).await.unwrap();
        if i % 3 == 0 {
            documents.approve(DocumentKind::Import, created.id, MANAGER).await.unwrap();
        }
        ids.push(created.id);
    }
    ids
}

async fn offset_ids(harness: &Harness, filter: &DocumentFilter, size: u32) -> Vec<i64> {
    let documents = harness.documents();
    let mut ids = Vec::new();
    let mut page = 0;
    loop {
        let result = documents
            .search(DocumentKind::Import, filter, Some(page), Some(size))
            .await
            .unwrap();
        ids.extend(result.data.iter().map(|d| d.id));
        if page + 1 >= result.pagination.total_pages {
            break;
        }
        page += 1;
    }
    ids
}

async fn keyset_ids(harness: &Harness, filter: &DocumentFilter, size: u32) -> Vec<i64> {
    let documents = harness.documents();
    let mut ids = Vec::new();
    let mut cursor: Option<KeysetCursor> = None;
    loop {
        let result = documents
            .search_keyset(DocumentKind::Import, filter, cursor, Some(size))
            .await
            .unwrap();
        ids.extend(result.data.iter().map(|d| d.id));
        if !result.has_more {
            break;
        }
        cursor = result.next_cursor;
    }
    ids
}

// ============================================================================
// Unit Tests
// ============================================================================

#[tokio::test]
async fn test_search_is_newest_first() {
    let harness = Harness::new();
    let ids = seed_imports(&harness, 4).await;

    let page = harness
        .documents()
        .search(DocumentKind::Import, &DocumentFilter::default(), None, None)
        .await
        .unwrap();

    let listed: Vec<i64> = page.data.iter().map(|d| d.id).collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(listed, expected);
    assert_eq!(page.pagination.page, 0);
    assert_eq!(page.pagination.per_page, 10);
}

#[tokio::test]
async fn test_search_filters_by_status_and_code() {
    let harness = Harness::new();
    seed_imports(&harness, 7).await;
    let documents = harness.documents();

    let approved = documents
        .search(
            DocumentKind::Import,
            &DocumentFilter {
                status: Some(DocumentStatus::Approved),
                ..Default::default()
            },
            None,
            None,
        )
        .await
        .unwrap();
    // 0, 3, 6
    assert_eq!(approved.pagination.total_items, 3);
    assert!(approved.data.iter().all(|d| d.status == DocumentStatus::Approved));

    let by_code = documents
        .search(
            DocumentKind::Import,
            &DocumentFilter {
                code: Some("imp-00".to_string()),
                ..Default::default()
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(by_code.pagination.total_items, 7);
}

#[tokio::test]
async fn test_search_filters_by_order() {
    let harness = Harness::new();
    seed_imports(&harness, 3).await;
    let documents = harness.documents();
    let mut input = import_input(vec![line(1, 1, "1", None)]);
    input.order_id = Some(4242);
    let fulfilling = documents.create(DocumentKind::Import, input, CLERK).await.unwrap();

    let filter = DocumentFilter {
        order_id: Some(4242),
        ..Default::default()
    };
    let page = documents
        .search(DocumentKind::Import, &filter, None, None)
        .await
        .unwrap();
    let listed: Vec<i64> = page.data.iter().map(|d| d.id).collect();

    assert_eq!(listed, vec![fulfilling.id]);
    assert_eq!(page.pagination.total_items, 1);
    assert_eq!(keyset_ids(&harness, &filter, 2).await, vec![fulfilling.id]);
}

#[tokio::test]
async fn test_store_filter_pages_only_that_store() {
    let harness = Harness::new();
    let ids = seed_imports(&harness, 9).await;
    let filter = DocumentFilter {
        store_id: Some(BRANCH_STORE),
        ..Default::default()
    };

    // Branch documents are the odd positions, newest first
    let expected: Vec<i64> = ids
        .iter()
        .enumerate()
        .rev()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, id)| *id)
        .collect();
    assert_eq!(expected.len(), 4);

    assert_eq!(offset_ids(&harness, &filter, 3).await, expected);
    assert_eq!(keyset_ids(&harness, &filter, 3).await, expected);

    let page = harness
        .documents()
        .search(DocumentKind::Import, &filter, Some(1), Some(3))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 4);
    assert_eq!(page.data.len(), 1);
    assert!(page.data.iter().all(|d| d.store.id == BRANCH_STORE));
}

#[tokio::test]
async fn test_search_does_not_mix_kinds() {
    let harness = Harness::new();
    seed_imports(&harness, 2).await;

    let exports = harness
        .documents()
        .search(DocumentKind::Export, &DocumentFilter::default(), None, None)
        .await
        .unwrap();

    assert!(exports.data.is_empty());
    assert_eq!(exports.pagination.total_items, 0);
}

#[tokio::test]
async fn test_page_size_is_clamped() {
    let harness = Harness::new();
    seed_imports(&harness, 3).await;

    let page = harness
        .documents()
        .search(DocumentKind::Import, &DocumentFilter::default(), Some(0), Some(10_000))
        .await
        .unwrap();

    assert_eq!(page.pagination.per_page, 100);
    assert_eq!(page.data.len(), 3);
}

#[tokio::test]
async fn test_keyset_last_page_has_no_more() {
    let harness = Harness::new();
    seed_imports(&harness, 5).await;
    let documents = harness.documents();

    let first = documents
        .search_keyset(DocumentKind::Import, &DocumentFilter::default(), None, Some(3))
        .await
        .unwrap();
    assert_eq!(first.data.len(), 3);
    assert!(first.has_more);

    let second = documents
        .search_keyset(
            DocumentKind::Import,
            &DocumentFilter::default(),
            first.next_cursor,
            Some(3),
        )
        .await
        .unwrap();
    assert_eq!(second.data.len(), 2);
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_list_totals_match_document_totals() {
    let harness = Harness::new();
    seed_imports(&harness, 6).await;
    let documents = harness.documents();

    let page = documents
        .search(DocumentKind::Import, &DocumentFilter::default(), None, None)
        .await
        .unwrap();

    for listed in &page.data {
        let single = documents.get(DocumentKind::Import, listed.id).await.unwrap();
        assert_eq!(listed.total, single.total);
        let from_items: rust_decimal::Decimal = single.items.iter().map(|i| i.total).sum();
        assert_eq!(single.total, from_items);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Property 8: walking keyset pages yields exactly the offset order
        #[test]
        fn prop_keyset_matches_offset(
            count in 0i64..25,
            size in 1u32..8,
            approved_only in any::<bool>(),
            branch_only in any::<bool>()
        ) {
            let (offset, keyset) = tokio_test::block_on(async {
                let harness = Harness::new();
                seed_imports(&harness, count).await;
                let filter = DocumentFilter {
                    status: approved_only.then_some(DocumentStatus::Approved),
                    store_id: branch_only.then_some(BRANCH_STORE),
                    ..Default::default()
                };
                (
                    offset_ids(&harness, &filter, size).await,
                    keyset_ids(&harness, &filter, size).await,
                )
            });

            prop_assert_eq!(offset, keyset);
        }
    }
}
