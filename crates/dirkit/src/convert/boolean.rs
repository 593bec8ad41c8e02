//! `TRUE`/`FALSE` directory booleans.

use super::{AttributeConverter, ConversionContext};
use crate::error::{DirectoryError, DirectoryResult};
use crate::record::AttributeValue;

/// Converts between `bool` and the directory's `TRUE`/`FALSE` syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl AttributeConverter for BooleanConverter {
    fn to_directory(
        &self,
        value: &AttributeValue,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<String> {
        let flag = expect_boolean(value, ctx.attribute())?;
        Ok(if flag { "TRUE" } else { "FALSE" }.to_string())
    }

    fn from_directory(
        &self,
        value: &str,
        ctx: &ConversionContext<'_>,
    ) -> DirectoryResult<AttributeValue> {
        parse_boolean(value).map(AttributeValue::Boolean).ok_or_else(|| {
            DirectoryError::conversion(ctx.attribute(), format!("'{value}' is not a boolean"))
        })
    }
}

/// Read a boolean input value.
///
/// Accepts a boolean or the `TRUE`/`FALSE` text form in any case; numbers
/// and other text are rejected.
pub(crate) fn expect_boolean(value: &AttributeValue, attribute: &str) -> DirectoryResult<bool> {
    match value.first() {
        Some(AttributeValue::Boolean(b)) => Ok(*b),
        Some(AttributeValue::String(s)) => parse_boolean(s).ok_or_else(|| {
            DirectoryError::conversion(attribute, format!("'{s}' is not a boolean"))
        }),
        Some(other) => Err(DirectoryError::conversion(
            attribute,
            format!("expected a boolean value, got {other:?}"),
        )),
        None => Err(DirectoryError::conversion(attribute, "expected a boolean value")),
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::OperationType;

    #[test]
    fn test_to_directory() {
        let mut ctx = ConversionContext::new(OperationType::SearchTo)
            .for_attribute("exchangeHideFromGAL", "msExchHideFromAddressLists");
        let converter = BooleanConverter;

        assert_eq!(converter.to_directory(&true.into(), &mut ctx).unwrap(), "TRUE");
        assert_eq!(converter.to_directory(&false.into(), &mut ctx).unwrap(), "FALSE");
        assert_eq!(converter.to_directory(&"false".into(), &mut ctx).unwrap(), "FALSE");
        assert!(converter.to_directory(&"maybe".into(), &mut ctx).is_err());
    }

    #[test]
    fn test_numbers_are_not_booleans() {
        let mut ctx = ConversionContext::new(OperationType::Modify)
            .for_attribute("exchangeHideFromGAL", "msExchHideFromAddressLists");
        let converter = BooleanConverter;

        for value in [AttributeValue::Integer(1), "1".into(), "0".into()] {
            let err = converter.to_directory(&value, &mut ctx).unwrap_err();
            assert_eq!(err.error_code(), "CONVERSION_FAILED");
        }
        assert!(converter.from_directory("1", &ctx).is_err());
    }

    #[test]
    fn test_from_directory() {
        let ctx = ConversionContext::new(OperationType::SearchFrom)
            .for_attribute("exchangeHideFromGAL", "msExchHideFromAddressLists");
        let converter = BooleanConverter;

        assert_eq!(
            converter.from_directory("TRUE", &ctx).unwrap(),
            AttributeValue::Boolean(true)
        );
        assert_eq!(
            converter.from_directory("FALSE", &ctx).unwrap(),
            AttributeValue::Boolean(false)
        );
        let err = converter.from_directory("yes", &ctx).unwrap_err();
        assert_eq!(err.error_code(), "CONVERSION_FAILED");
    }
}
