//! Catalog item and business group lookups.

use crate::error::{Error, Result};
use crate::transport::{Transport, get_json, segment};
use crate::types::{BusinessGroup, CatalogItem, CatalogItemView, Page};

/// Default number of entries requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const CATALOG_ITEM_KIND: &str = "catalog item";
const BUSINESS_GROUP_KIND: &str = "business group";

/// Resolves catalog item and business group names and ids.
pub struct CatalogResolver<'a> {
    transport: &'a dyn Transport,
    page_size: u32,
}

impl<'a> CatalogResolver<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Find the id of the entitled catalog item called `name`.
    ///
    /// An exact match wins as soon as it is seen, even when other items share
    /// its prefix. Without an exact match, items whose name starts with
    /// `name` make the lookup ambiguous rather than picking one.
    pub fn resolve_catalog_item_id(&self, name: &str) -> Result<String> {
        let mut prefix_matches = Vec::new();
        let mut page_number = 1u64;

        loop {
            let path = format!(
                "catalog-service/api/consumer/entitledCatalogItemViews?page={page_number}&limit={}",
                self.page_size
            );
            let page: Page<CatalogItemView> = get_json(self.transport, &path)?;
            log::debug!(
                "Catalog page {page_number}/{} with {} item(s)",
                page.metadata.total_pages,
                page.content.len()
            );

            for item in &page.content {
                if item.name == name {
                    log::debug!("Catalog item '{name}' is {}", item.catalog_item_id);
                    return Ok(item.catalog_item_id.clone());
                }
                if item.name.starts_with(name) {
                    prefix_matches.push(item.name.clone());
                }
            }

            if page.content.is_empty() || page_number >= page.metadata.total_pages {
                break;
            }
            page_number += 1;
        }

        if prefix_matches.is_empty() {
            Err(Error::not_found(CATALOG_ITEM_KIND, name))
        } else {
            Err(Error::AmbiguousName {
                name: name.to_string(),
                matches: prefix_matches,
            })
        }
    }

    /// Find the name of the catalog item with `id`.
    pub fn resolve_catalog_item_name(&self, id: &str) -> Result<String> {
        let path = format!("catalog-service/api/consumer/catalogItems/{}", segment(id));
        let response = self.transport.get(&path)?;
        if !response.is_success() {
            log::debug!("Catalog item lookup for {id} answered HTTP {}", response.status);
            return Err(Error::not_found(CATALOG_ITEM_KIND, id));
        }
        let item: CatalogItem = response.json()?;
        Ok(item.name)
    }

    /// Find the id of the business group called `name` in `tenant`.
    pub fn resolve_business_group_id(&self, name: &str, tenant: &str) -> Result<String> {
        self.find_business_group(tenant, |group| group.name == name)?
            .map(|group| group.id)
            .ok_or_else(|| Error::not_found(BUSINESS_GROUP_KIND, name))
    }

    /// Find the name of the business group with `id` in `tenant`.
    pub fn resolve_business_group_name(&self, id: &str, tenant: &str) -> Result<String> {
        self.find_business_group(tenant, |group| group.id == id)?
            .map(|group| group.name)
            .ok_or_else(|| Error::not_found(BUSINESS_GROUP_KIND, id))
    }

    /// Page through the business groups of `tenant` until `matches` hits.
    fn find_business_group(
        &self,
        tenant: &str,
        matches: impl Fn(&BusinessGroup) -> bool,
    ) -> Result<Option<BusinessGroup>> {
        let mut page_number = 1u64;

        loop {
            let path = format!(
                "identity/api/tenants/{}/subtenants?page={page_number}&limit={}",
                segment(tenant),
                self.page_size
            );
            let page: Page<BusinessGroup> = get_json(self.transport, &path)?;
            log::debug!(
                "Business group page {page_number}/{} with {} group(s)",
                page.metadata.total_pages,
                page.content.len()
            );

            let last = page.content.is_empty() || page_number >= page.metadata.total_pages;
            if let Some(group) = page.content.into_iter().find(&matches) {
                return Ok(Some(group));
            }
            if last {
                return Ok(None);
            }
            page_number += 1;
        }
    }
}
