//! Paged listing
//!
//! Walks a provider listing page by page, threading the cursor from one call
//! to the next, and hands items out one at a time.

use super::cursor::Cursor;
use super::error::{CoreError, CoreResult};
use crate::remote::model::{ListQuery, Page, RemoteError};
use crate::remote::RemoteResourceService;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;

/// Lists collections through a [`RemoteResourceService`]
#[derive(Debug)]
pub struct PagedLister<'a, S: RemoteResourceService + ?Sized> {
    service: &'a S,
}

/// Listing progress carried between pages
struct Walk {
    cursor: Cursor,
    pages: usize,
}

impl<'a, S: RemoteResourceService + ?Sized> PagedLister<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Fetch a single page, starting at `cursor` (or the beginning)
    pub async fn list_page(&self, query: &ListQuery, cursor: Option<&str>) -> CoreResult<Page> {
        let page = self
            .service
            .list_page(query, cursor)
            .await
            .map_err(|source| CoreError::Listing { source })?;

        if let (Some(sent), Some(received)) = (cursor, page.next.token()) {
            if sent == received {
                return Err(CoreError::Listing {
                    source: RemoteError::coded(
                        "RepeatedCursor",
                        format!("provider returned the cursor it was given ({sent})"),
                    ),
                });
            }
        }
        Ok(page)
    }

    /// Every item of the listing, fetched lazily.
    ///
    /// A page is requested only once the previous one has been consumed, and
    /// nothing is requested after the consumer stops pulling. An error ends
    /// the stream; items already yielded stay valid.
    pub fn list_all(&self, query: &'a ListQuery) -> impl Stream<Item = CoreResult<Value>> + 'a {
        let service = self.service;
        let start = Walk {
            cursor: Cursor::start(),
            pages: 0,
        };

        stream::try_unfold(start, move |walk| async move {
            if walk.cursor.is_exhausted() {
                tracing::debug!("Listing finished after {} page(s)", walk.pages);
                return Ok::<_, CoreError>(None);
            }

            let page = match PagedLister::new(service).list_page(query, walk.cursor.token()).await {
                Ok(page) => page,
                Err(err) => return Err(err),
            };
            tracing::debug!(
                "Page {}: {} items, more: {}",
                walk.pages + 1,
                page.items.len(),
                !page.next.is_exhausted()
            );

            let items = stream::iter(page.items.into_iter().map(Ok::<_, CoreError>));
            let next = Walk {
                cursor: page.next,
                pages: walk.pages + 1,
            };
            Ok(Some((items, next)))
        })
        .try_flatten()
    }

    /// Collect the listing, stopping after `limit` items when given
    pub async fn collect_all(&self, query: &ListQuery, limit: Option<usize>) -> CoreResult<Vec<Value>> {
        let lister = PagedLister::new(self.service);
        let items = lister.list_all(query);
        match limit {
            Some(n) => items.take(n).try_collect().await,
            None => items.try_collect().await,
        }
    }
}
