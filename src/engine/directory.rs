use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use super::cache::TtlCache;
use super::normalize::therapist_page;
use crate::backend::{ClinicBackend, Credentials};
use crate::models::{Id, Therapist, TherapistPage};

/// A page plus the error that emptied it, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryPage {
    #[serde(flatten)]
    pub page: TherapistPage,
    pub error: Option<String>,
}

/// Therapist listing and search. The default first page is cached together
/// with the credentials it was fetched under and only served back to them.
pub struct TherapistDirectory {
    first_page: Mutex<TtlCache<(Credentials, TherapistPage)>>,
    page_size: u32,
}

impl TherapistDirectory {
    pub fn new(ttl: Duration, page_size: u32) -> Self {
        Self {
            first_page: Mutex::new(TtlCache::new(ttl)),
            page_size: page_size.max(1),
        }
    }

    pub async fn list(
        &self,
        backend: &dyn ClinicBackend,
        creds: &Credentials,
        page: u32,
        page_size: Option<u32>,
    ) -> DirectoryPage {
        let page = page.max(1);
        let page_size = page_size.unwrap_or(self.page_size).max(1);
        let default_page = page == 1 && page_size == self.page_size;

        let cached = if default_page {
            self.first_page
                .lock()
                .ok()
                .and_then(|c| c.get())
                .and_then(|(owner, hit)| (owner == *creds).then_some(hit))
        } else {
            None
        };
        if let Some(hit) = cached {
            return DirectoryPage { page: hit, error: None };
        }

        let fetched = match backend.therapists(page, page_size).await {
            Ok(raw) => therapist_page(raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match fetched {
            Ok(p) => {
                if default_page {
                    if let Ok(mut cache) = self.first_page.lock() {
                        cache.put((creds.clone(), p.clone()));
                    }
                }
                DirectoryPage { page: p, error: None }
            }
            Err(error) => {
                warn!(page, page_size, %error, "therapist listing unavailable");
                DirectoryPage {
                    page: TherapistPage::default(),
                    error: Some(error),
                }
            }
        }
    }

    pub async fn search(
        &self,
        backend: &dyn ClinicBackend,
        creds: &Credentials,
        term: &str,
        page: u32,
        page_size: Option<u32>,
    ) -> DirectoryPage {
        let term = term.trim();
        if term.is_empty() {
            return self.list(backend, creds, page, page_size).await;
        }
        let page = page.max(1);
        let page_size = page_size.unwrap_or(self.page_size).max(1);

        let fetched = match backend.search_therapists(term, page, page_size).await {
            Ok(raw) => therapist_page(raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match fetched {
            Ok(p) => DirectoryPage { page: p, error: None },
            Err(error) => {
                warn!(term, %error, "therapist search unavailable");
                DirectoryPage {
                    page: TherapistPage::default(),
                    error: Some(error),
                }
            }
        }
    }

    /// Looks a therapist up in the default page.
    pub async fn lookup(&self, backend: &dyn ClinicBackend, creds: &Credentials, id: Id) -> Option<Therapist> {
        self.list(backend, creds, 1, None)
            .await
            .page
            .items
            .into_iter()
            .find(|t| t.id == id)
    }
}
