//! The opaque structured value the engine stores.
//!
//! The engine never inspects a document's fields -- it is passed through
//! to the store verbatim. `serde_json::Value` already models the nested
//! object/array/string/number/bool/null shape spec.md's data model calls
//! for, so there is no need for a bespoke variant type.

/// A single stored record's value.
pub type Document = serde_json::Value;

/// Returns `true` if `doc` is a JSON object.
///
/// `insert`/`upsert` reject non-mapping documents with `InvalidArgument`;
/// this is the check that enforces it.
#[must_use]
pub fn is_mapping(doc: &Document) -> bool {
    doc.is_object()
}
