//! Token-threaded pagination over list calls

use std::future::Future;

use crate::error::{LifecycleError, LifecycleResult};

/// Pages fetched before giving up on a list that never ends
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// One page of a list call
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque token for the next page; `None` on the last one
    pub next_page: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Call `fetch` with each next-page token until the list is exhausted
pub async fn collect_all<T, F, Fut>(fetch: F) -> LifecycleResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = LifecycleResult<Page<T>>>,
{
    collect_all_bounded(fetch, DEFAULT_PAGE_LIMIT).await
}

pub async fn collect_all_bounded<T, F, Fut>(mut fetch: F, max_pages: usize) -> LifecycleResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = LifecycleResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut token = None;

    for page_number in 1..=max_pages {
        let page = fetch(token.take()).await?;
        items.extend(page.items);
        match page.next_page {
            Some(next) if !next.is_empty() => {
                log::debug!("fetching page {} (token {})", page_number + 1, next);
                token = Some(next);
            }
            _ => return Ok(items),
        }
    }

    Err(LifecycleError::data(format!(
        "list did not finish after {} pages",
        max_pages
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    fn numbered_pages(total: usize, per_page: usize) -> impl FnMut(Option<String>) -> std::future::Ready<LifecycleResult<Page<usize>>> {
        move |token| {
            let start: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + per_page).min(total);
            let next_page = (end < total).then(|| end.to_string());
            std::future::ready(Ok(Page {
                items: (start..end).collect(),
                next_page,
            }))
        }
    }

    #[tokio::test]
    async fn collects_every_page() {
        let items = collect_all(numbered_pages(25, 10)).await.unwrap();
        assert_eq!(items, (0..25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn single_page() {
        let items = collect_all(|_| async { Ok::<_, LifecycleError>(Page::last(vec!["only"])) })
            .await
            .unwrap();
        assert_eq!(items, vec!["only"]);
    }

    #[tokio::test]
    async fn endless_token_hits_the_page_limit() {
        let err = collect_all_bounded(
            |_| async {
                Ok::<_, LifecycleError>(Page {
                    items: vec![1],
                    next_page: Some("same".to_string()),
                })
            },
            5,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("5 pages"));
    }

    #[tokio::test]
    async fn error_on_a_later_page_is_returned() {
        let mut calls = 0;
        let result: LifecycleResult<Vec<u8>> = collect_all(|_| {
            calls += 1;
            let page = if calls == 1 {
                Ok(Page {
                    items: vec![1],
                    next_page: Some("2".to_string()),
                })
            } else {
                Err(ServiceError::new(500, "InternalError", "boom").into())
            };
            async move { page }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
