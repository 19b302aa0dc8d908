//! # Collections
//!
//! A [`Collection`] is a lazy handle to a remote list of structured objects,
//! such as a page of search results. It wraps a [`Resource`] whose class
//! declares an `entries` field holding a list of nested objects (see
//! [`crate::Registry::page_of`] and [`crate::Registry::list_of`]) and reads
//! that field as a sequence.
//!
//! ## Slicing
//!
//! Slicing does not index into fetched data. It narrows the request instead,
//! producing a new pending collection whose URL carries paging parameters:
//!
//! | Range | Query parameters |
//! |-------|------------------|
//! | `s..e` | `offset=s&limit=e-s` |
//! | `s..` | `offset=s` |
//! | `..e` | `limit=e` |
//! | `..` | none added |
//!
//! Offsets are absolute and replace any `offset` or `limit` already in the
//! URL.

use crate::class::ClassDef;
use crate::error::{RestError, Result};
use crate::object::DataObject;
use crate::resource::Resource;
use crate::transport::Transport;
use crate::value::Value;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

const ENTRIES: &str = "entries";

/// A lazily fetched list of structured objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    resource: Resource,
}

impl Collection {
    /// A pending collection at `url`.
    pub fn at(class: &Arc<ClassDef>, url: impl Into<String>) -> Self {
        Self::from_resource(Resource::at(class, url))
    }

    /// Fetch the collection at `url` now.
    pub fn fetch(class: &Arc<ClassDef>, url: impl Into<String>) -> Result<Self> {
        Resource::fetch(class, url).map(Self::from_resource)
    }

    pub fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        Self::from_resource(self.resource.with_transport(transport))
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }

    pub fn into_resource(self) -> Resource {
        self.resource
    }

    /// The entries, delivering first if pending. An absent `entries` field
    /// reads as empty.
    pub fn entries(&mut self) -> Result<&[Value]> {
        Ok(self
            .resource
            .get(ENTRIES)?
            .and_then(Value::as_list)
            .unwrap_or_default())
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    /// The entry at `index`, if there is one.
    pub fn entry(&mut self, index: usize) -> Result<Option<&DataObject>> {
        Ok(self.entries()?.get(index).and_then(Value::as_object))
    }

    /// Iterate over the entries as objects.
    pub fn iter(&mut self) -> Result<impl Iterator<Item = &DataObject>> {
        Ok(self.entries()?.iter().filter_map(Value::as_object))
    }

    /// Append an entry locally. Send it with [`Resource::put`] on
    /// [`Collection::resource_mut`], or add it remotely with
    /// [`Resource::post`] instead.
    pub fn push(&mut self, entry: DataObject) -> Result<()> {
        match self.resource.get_mut(ENTRIES)? {
            Some(Value::List(items)) => items.push(Value::from(entry)),
            _ => self
                .resource
                .set(ENTRIES, Value::List(vec![Value::from(entry)]))?,
        }
        Ok(())
    }

    /// A new pending collection with `params` merged into the query string.
    pub fn filter<I, K, V>(&self, params: I) -> Result<Collection>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.resource.filter(params).map(Self::from_resource)
    }

    /// A new pending collection for the entries in `range`. Bounds at
    /// `usize::MAX` saturate rather than wrap.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Collection> {
        let start = match range.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => Some(s.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => Some(e.saturating_add(1)),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };
        self.filter(slice_params(start, stop)?)
    }
}

fn slice_params(start: Option<usize>, stop: Option<usize>) -> Result<Vec<(&'static str, usize)>> {
    match (start, stop) {
        (Some(start), Some(stop)) if stop < start => Err(RestError::InvalidSlice { start, stop }),
        (Some(start), Some(stop)) => Ok(vec![("offset", start), ("limit", stop - start)]),
        (Some(start), None) => Ok(vec![("offset", start)]),
        (None, Some(stop)) => Ok(vec![("limit", stop)]),
        (None, None) => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_parameter_mapping() {
        assert_eq!(
            slice_params(Some(5), Some(15)).unwrap(),
            vec![("offset", 5), ("limit", 10)]
        );
        assert_eq!(slice_params(Some(5), None).unwrap(), vec![("offset", 5)]);
        assert_eq!(slice_params(None, Some(10)).unwrap(), vec![("limit", 10)]);
        assert!(slice_params(None, None).unwrap().is_empty());
    }

    #[test]
    fn backwards_slice_is_rejected() {
        let err = slice_params(Some(10), Some(5)).unwrap_err();
        assert!(matches!(err, RestError::InvalidSlice { start: 10, stop: 5 }));
    }
}
