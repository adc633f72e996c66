//! Paginated object listing
//!
//! Collects every object under a prefix by following listing markers until
//! the store reports the listing complete.

use blobping_common::{Error, Result};
use blobping_store::{ListRequest, ObjectStore, ObjectSummary};
use tracing::trace;

/// Entries requested per listing page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Predicate applied to each listed entry
pub type ListFilter<'a> = &'a (dyn Fn(&ObjectSummary) -> bool + Send + Sync);

/// List every object under `prefix`
///
/// A failure on any page fails the whole listing. When a truncated page
/// carries no `next_marker`, the greatest key or common prefix of the page is
/// used instead.
pub async fn list_all(
    store: &dyn ObjectStore,
    prefix: &str,
    delimiter: Option<&str>,
    page_size: u32,
    filter: Option<ListFilter<'_>>,
) -> Result<Vec<ObjectSummary>> {
    let mut objects = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = store
            .list_objects(ListRequest {
                prefix,
                delimiter,
                marker: marker.as_deref(),
                max_keys: page_size,
            })
            .await?;
        pages += 1;

        let last_key = page
            .summaries
            .last()
            .map(|s| s.key.clone())
            .max(page.common_prefixes.last().cloned());

        match filter {
            Some(filter) => objects.extend(page.summaries.into_iter().filter(|s| filter(s))),
            None => objects.extend(page.summaries),
        }

        if !page.is_truncated {
            break;
        }

        let next = page.next_marker.or(last_key).ok_or_else(|| {
            Error::storage(format!(
                "listing of '{prefix}' truncated without a continuation marker"
            ))
        })?;
        if marker.as_deref() == Some(next.as_str()) {
            return Err(Error::storage(format!(
                "listing of '{prefix}' did not advance past '{next}'"
            )));
        }
        marker = Some(next);
    }

    trace!(
        "Listed {} objects under '{}' in {} page(s)",
        objects.len(),
        prefix,
        pages
    );
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blobping_store::{DeleteFailure, MemoryObjectStore, ObjectListing, PutOptions, StoredObject};
    use bytes::Bytes;
    use chrono::Utc;

    fn store_with(keys: &[&str]) -> MemoryObjectStore {
        let store = MemoryObjectStore::new("membership");
        for key in keys {
            store.insert(*key, "x");
        }
        store
    }

    #[tokio::test]
    async fn test_list_all_single_page() {
        let store = store_with(&["jg/demo/A", "jg/demo/B", "jg/other/C"]);
        let objects = list_all(&store, "jg/demo/", None, DEFAULT_PAGE_SIZE, None)
            .await
            .unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["jg/demo/A", "jg/demo/B"]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_list_all_follows_pages() {
        let store = store_with(&[
            "jg/demo/A",
            "jg/demo/B",
            "jg/demo/C",
            "jg/demo/D",
            "jg/demo/E",
        ]);
        let objects = list_all(&store, "jg/demo/", None, 2, None).await.unwrap();
        assert_eq!(objects.len(), 5);
        assert_eq!(objects[4].key, "jg/demo/E");
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_all_applies_filter() {
        let store = store_with(&["jg/demo/A", "jg/demo/B", "jg/demo/C"]);
        store.insert("jg/demo/D", Bytes::new());
        let non_empty = |s: &ObjectSummary| !s.is_empty();
        let objects = list_all(&store, "jg/demo/", None, 2, Some(&non_empty))
            .await
            .unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.iter().all(|o| o.key != "jg/demo/D"));
    }

    #[tokio::test]
    async fn test_list_all_with_delimiter() {
        let store = store_with(&["jg/demo/A", "jg/demo/B", "jg/other/X", "jg/top"]);
        let objects = list_all(&store, "jg/", Some("/"), 1, None).await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["jg/top"]);
    }

    #[tokio::test]
    async fn test_list_all_fails_on_page_error() {
        let store = store_with(&["jg/demo/A", "jg/demo/B", "jg/demo/C"]);
        store.fail_list_page(2);
        let err = list_all(&store, "jg/demo/", None, 1, None).await.unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }

    /// Store that claims truncation but never returns anything
    struct EndlessStore;

    #[async_trait]
    impl ObjectStore for EndlessStore {
        fn bucket(&self) -> &str {
            "endless"
        }

        async fn list_objects(&self, _request: ListRequest<'_>) -> Result<ObjectListing> {
            Ok(ObjectListing {
                is_truncated: true,
                ..ObjectListing::default()
            })
        }

        async fn get_object(&self, key: &str) -> Result<StoredObject> {
            Ok(StoredObject {
                key: key.to_string(),
                body: Bytes::new(),
                last_modified: Some(Utc::now()),
            })
        }

        async fn put_object(&self, _key: &str, _body: Bytes, _options: &PutOptions) -> Result<()> {
            Ok(())
        }

        async fn delete_objects(&self, _keys: &[String], _quiet: bool) -> Result<Vec<DeleteFailure>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_empty_truncated_page_is_an_error() {
        let err = list_all(&EndlessStore, "jg/demo/", None, 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
