//! Named boolean flags packed into one 32-bit wire attribute.
//!
//! Values such as `groupType` and `userAccountControl` are stored as the
//! signed decimal rendering of a 32-bit word. Each friendly attribute mapped
//! to the converter names one flag; the context's current attribute selects
//! which flag a conversion is about.
//!
//! Writes aggregate: the new word is derived from the entry's current word
//! (or from the previous write within the same context), never from scratch.

use std::collections::{BTreeMap, HashMap};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::boolean::expect_boolean;
use super::{AttributeConverter, ConversionContext, OperationType};
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{Comparison, FilterNode, MATCHING_RULE_BIT_AND};
use crate::record::AttributeValue;

/// A set of mutually exclusive flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagGroup {
    /// Group name, for diagnostics.
    pub name: String,
    /// Member flag names.
    pub flags: Vec<String>,
    /// When set, clearing the last bit of the group restores the group's
    /// bits from the default value.
    #[serde(default)]
    pub required: bool,
}

impl FlagGroup {
    /// Create an optional group.
    pub fn new<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            flags: flags.into_iter().map(Into::into).collect(),
            required: false,
        }
    }

    /// Mark the group as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declarative configuration for a [`BitmaskConverter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmaskOptions {
    /// Wire value to start from when no stored value exists.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Mutually exclusive flag groups.
    #[serde(default)]
    pub groups: Vec<FlagGroup>,
    /// Flags that read true when their bit is clear.
    #[serde(default)]
    pub inverted: Vec<String>,
    /// Flag name to bit value.
    ///
    /// Bits load from numbers or decimal strings, signed or unsigned, in the
    /// same 32-bit two's complement form as the default value.
    #[serde(deserialize_with = "deserialize_flags")]
    pub flags: BTreeMap<String, u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBit {
    Number(i64),
    Text(String),
}

fn deserialize_flags<'de, D>(deserializer: D) -> Result<BTreeMap<String, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, RawBit>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, raw)| {
            let bit = match &raw {
                RawBit::Number(value) => word_from_i64(*value),
                RawBit::Text(text) => parse_word(text),
            };
            bit.map(|bit| (name.clone(), bit)).ok_or_else(|| {
                D::Error::custom(format!("bit value of flag '{name}' is not a 32-bit word"))
            })
        })
        .collect()
}

impl BitmaskOptions {
    /// Create options from a flag map.
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(|(name, bit)| (name.into(), bit)).collect(),
            ..Self::default()
        }
    }

    /// Set the default wire value.
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Add a flag group.
    pub fn with_group(mut self, group: FlagGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Declare a flag as inverted.
    pub fn with_inverted(mut self, flag: impl Into<String>) -> Self {
        self.inverted.push(flag.into());
        self
    }

    /// Parse options from JSON.
    pub fn from_json(json: &str) -> DirectoryResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            DirectoryError::configuration(format!("invalid bitmask options: {e}"))
        })
    }
}

#[derive(Debug, Clone)]
struct Flag {
    name: String,
    bit: u32,
    inverted: bool,
    group: Option<usize>,
}

#[derive(Debug, Clone)]
struct Group {
    mask: u32,
    bits: Vec<u32>,
    required: bool,
}

/// Converts named flags to and from a shared 32-bit wire value.
#[derive(Debug, Clone)]
pub struct BitmaskConverter {
    flags: HashMap<String, Flag>,
    groups: Vec<Group>,
    default_text: Option<String>,
    default_word: u32,
}

impl BitmaskConverter {
    /// Build a converter, validating the options.
    ///
    /// # Errors
    /// Configuration error for zero bits, unknown flags in groups or the
    /// inverted list, flags in more than one group, or an unparsable default.
    pub fn new(options: BitmaskOptions) -> DirectoryResult<Self> {
        let default_word = match options.default_value.as_deref() {
            Some(text) => parse_word(text).ok_or_else(|| {
                DirectoryError::configuration(format!(
                    "bitmask default value '{text}' is not a number"
                ))
            })?,
            None => 0,
        };

        let mut flags = HashMap::with_capacity(options.flags.len());
        for (name, bit) in &options.flags {
            if *bit == 0 {
                return Err(DirectoryError::configuration(format!(
                    "bitmask flag '{name}' has no bit set"
                )));
            }
            flags.insert(
                name.to_lowercase(),
                Flag {
                    name: name.clone(),
                    bit: *bit,
                    inverted: false,
                    group: None,
                },
            );
        }

        for name in &options.inverted {
            lookup_mut(&mut flags, name)?.inverted = true;
        }

        let mut groups = Vec::with_capacity(options.groups.len());
        for (index, group) in options.groups.iter().enumerate() {
            let mut bits = Vec::with_capacity(group.flags.len());
            for name in &group.flags {
                let flag = lookup_mut(&mut flags, name)?;
                if flag.group.is_some() {
                    return Err(DirectoryError::configuration(format!(
                        "bitmask flag '{name}' belongs to more than one group"
                    )));
                }
                flag.group = Some(index);
                bits.push(flag.bit);
            }
            groups.push(Group {
                mask: bits.iter().fold(0, |mask, bit| mask | bit),
                bits,
                required: group.required,
            });
        }

        Ok(Self {
            flags,
            groups,
            default_text: options.default_value,
            default_word,
        })
    }

    fn flag(&self, ctx: &ConversionContext<'_>) -> DirectoryResult<&Flag> {
        self.flags
            .get(&ctx.attribute().to_lowercase())
            .ok_or_else(|| {
                DirectoryError::configuration(format!(
                    "unknown bitmask flag '{}'",
                    ctx.attribute()
                ))
            })
    }

    /// Apply one flag to a word, keeping group exclusivity.
    fn apply(&self, mut word: u32, flag: &Flag, value: bool) -> u32 {
        let group = flag.group.and_then(|index| self.groups.get(index));

        if value != flag.inverted {
            word |= flag.bit;
            if let Some(group) = group {
                for sibling in group.bits.iter().filter(|bit| **bit != flag.bit) {
                    word &= !sibling;
                }
            }
        } else {
            word &= !flag.bit;
            if let Some(group) = group.filter(|g| g.required && word & g.mask == 0) {
                word |= self.default_word & group.mask;
            }
        }
        word
    }
}

fn lookup_mut<'a>(
    flags: &'a mut HashMap<String, Flag>,
    name: &str,
) -> DirectoryResult<&'a mut Flag> {
    flags.get_mut(&name.to_lowercase()).ok_or_else(|| {
        DirectoryError::configuration(format!("unknown bitmask flag '{name}'"))
    })
}

/// Parse a signed or unsigned decimal into its 32-bit two's complement word.
fn parse_word(text: &str) -> Option<u32> {
    word_from_i64(text.trim().parse().ok()?)
}

fn word_from_i64(value: i64) -> Option<u32> {
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as u32)
}

/// Render a word the way the directory stores it: as a signed 32-bit integer.
fn format_word(word: u32) -> String {
    (word as i32).to_string()
}

impl AttributeConverter for BitmaskConverter {
    fn to_directory(
        &self,
        value: &AttributeValue,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<String> {
        let flag = self.flag(ctx)?;
        let requested = expect_boolean(value, ctx.attribute())?;

        if !self.aggregates(ctx.operation()) {
            return Ok(if requested != flag.inverted {
                flag.bit.to_string()
            } else {
                format_word(!flag.bit)
            });
        }

        let current_text = ctx.current_value(self.default_text.as_deref())?;
        let current = parse_word(&current_text).ok_or_else(|| {
            DirectoryError::conversion(
                ctx.wire_attribute(),
                format!("stored value '{current_text}' is not a number"),
            )
        })?;
        let updated = self.apply(current, flag, requested);

        debug!(
            flag = %flag.name,
            value = requested,
            current = %current_text,
            "Applied bitmask flag"
        );

        let result = if updated == current {
            current_text
        } else {
            format_word(updated)
        };
        ctx.record_value(result.clone());
        Ok(result)
    }

    fn from_directory(
        &self,
        value: &str,
        ctx: &ConversionContext<'_>,
    ) -> DirectoryResult<AttributeValue> {
        let flag = self.flag(ctx)?;
        let word = parse_word(value).ok_or_else(|| {
            DirectoryError::conversion(ctx.attribute(), format!("'{value}' is not a number"))
        })?;
        let set = word & flag.bit == flag.bit;
        Ok(AttributeValue::Boolean(set != flag.inverted))
    }

    fn aggregates(&self, operation: OperationType) -> bool {
        operation.is_write()
    }

    fn default_value(&self) -> Option<&str> {
        self.default_text.as_deref()
    }

    fn to_search_filter(
        &self,
        comparison: &Comparison,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<FilterNode> {
        let flag = self.flag(ctx)?;
        let wanted = expect_boolean(&comparison.value, ctx.attribute())? != flag.inverted;
        let node = FilterNode::matching_rule(
            ctx.wire_attribute(),
            MATCHING_RULE_BIT_AND,
            flag.bit.to_string(),
        );
        Ok(if wanted { node } else { FilterNode::negate(node) })
    }
}
