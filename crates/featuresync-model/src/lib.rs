//! Featuresync attribute model
//!
//! Pure data shared by the reconciliation engine and its callers:
//!
//! - `scalar`: primitive kinds, typed scalar payloads and identity keys
//! - `value`: attribute values (primitive, many-to-one, one-to-many) and the
//!   association values they carry
//! - `schema`: feature schemas describing identifiers and attributes
//!
//! Nothing in this crate touches an entity graph; the engine crate owns that.

pub mod error;
pub mod scalar;
pub mod schema;
pub mod value;

pub use error::{ConversionError, ModelError, SchemaError};
pub use scalar::{IdentityKey, PrimitiveKind, Scalar};
pub use schema::{
    AssociationAttributeInfo, AssociationKind, AttributeInfo, FeatureSchema,
    PrimitiveAttributeInfo,
};
pub use value::{
    AssociationValue, AttributeMap, AttributeValue, ManyToOneAttribute, OneToManyAttribute,
    PrimitiveAttribute,
};
