use featuresync_model::{AttributeValue, ConversionError, PrimitiveAttribute, PrimitiveAttributeInfo, Scalar};

/// Turns raw values read from an entity into attribute values (read path).
pub trait DtoConverter {
    fn to_dto(
        &self,
        raw: Option<Scalar>,
        info: &PrimitiveAttributeInfo,
    ) -> Result<AttributeValue, ConversionError>;
}

/// Coerces the raw scalar to the declared kind and carries the schema's
/// editability.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl DtoConverter for DefaultConverter {
    fn to_dto(
        &self,
        raw: Option<Scalar>,
        info: &PrimitiveAttributeInfo,
    ) -> Result<AttributeValue, ConversionError> {
        let value = raw.map(|scalar| scalar.coerce_to(info.kind)).transpose()?;
        Ok(AttributeValue::Primitive(
            PrimitiveAttribute::new(info.kind, value).with_editable(info.editable),
        ))
    }
}
