//! Enhanced source maps: a bidirectional generated↔original position index
//! with node types, symbols and scope ranges, persisted as `X.sly.map` next
//! to the generated module.

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const SOURCE_MAP_VERSION: u32 = 1;

/// One generated↔original pair. Serialized compactly as
/// `[gen_line, gen_col, source_index, orig_line, orig_col, node_type, symbol, scope_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: usize,
    pub generated_column: usize,
    pub source: usize,
    pub original_line: usize,
    pub original_column: usize,
    pub node_type: String,
    pub symbol: Option<String>,
    pub scope_id: Option<usize>,
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(8))?;
        seq.serialize_element(&self.generated_line)?;
        seq.serialize_element(&self.generated_column)?;
        seq.serialize_element(&self.source)?;
        seq.serialize_element(&self.original_line)?;
        seq.serialize_element(&self.original_column)?;
        seq.serialize_element(&self.node_type)?;
        seq.serialize_element(&self.symbol)?;
        seq.serialize_element(&self.scope_id)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = Mapping;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a compact mapping array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Mapping, A::Error> {
                let missing = || serde::de::Error::custom("mapping array too short");
                Ok(Mapping {
                    generated_line: seq.next_element()?.ok_or_else(missing)?,
                    generated_column: seq.next_element()?.ok_or_else(missing)?,
                    source: seq.next_element()?.ok_or_else(missing)?,
                    original_line: seq.next_element()?.ok_or_else(missing)?,
                    original_column: seq.next_element()?.ok_or_else(missing)?,
                    node_type: seq.next_element()?.ok_or_else(missing)?,
                    symbol: seq.next_element()?.ok_or_else(missing)?,
                    scope_id: seq.next_element()?.ok_or_else(missing)?,
                })
            }
        }

        deserializer.deserialize_seq(MappingVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRange {
    pub name: String,
    pub original_start: usize,
    pub original_end: usize,
    pub generated_start: usize,
    pub generated_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMapping {
    pub original_name: String,
    pub generated_name: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub breakpoint_lines: Vec<usize>,
    pub function_ranges: Vec<FunctionRange>,
    pub variable_mappings: Vec<VariableMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    pub version: u32,
    pub sources: Vec<String>,
    pub mappings: Vec<Mapping>,
    pub names: Vec<String>,
    #[serde(rename = "debugInfo")]
    pub debug_info: DebugInfo,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        SourceMap {
            version: SOURCE_MAP_VERSION,
            sources: vec![source.to_owned()],
            mappings: vec![],
            names: vec![],
            debug_info: DebugInfo::default(),
        }
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        if let Some(symbol) = &mapping.symbol {
            if !self.names.contains(symbol) {
                self.names.push(symbol.clone());
            }
        }
        if !self
            .debug_info
            .breakpoint_lines
            .contains(&mapping.original_line)
        {
            self.debug_info.breakpoint_lines.push(mapping.original_line);
        }
        self.mappings.push(mapping);
    }

    pub fn add_function_range(&mut self, range: FunctionRange) {
        self.debug_info.function_ranges.push(range);
    }

    pub fn add_variable_mapping(&mut self, mapping: VariableMapping) {
        if !self.debug_info.variable_mappings.contains(&mapping) {
            self.debug_info.variable_mappings.push(mapping);
        }
    }

    /// Original position for a generated line, most specific mapping first.
    pub fn original_for(&self, generated_line: usize) -> Option<&Mapping> {
        self.mappings
            .iter()
            .filter(|mapping| mapping.generated_line == generated_line)
            .max_by_key(|mapping| mapping.generated_column)
    }

    /// Generated lines that originate from an original line.
    pub fn generated_for(&self, original_line: usize) -> Vec<&Mapping> {
        self.mappings
            .iter()
            .filter(|mapping| mapping.original_line == original_line)
            .collect()
    }

    pub fn sort(&mut self) {
        self.mappings.sort_by_key(|mapping| {
            (
                mapping.generated_line,
                mapping.generated_column,
                mapping.original_line,
            )
        });
        self.debug_info.breakpoint_lines.sort_unstable();
        self.debug_info.breakpoint_lines.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(generated_line: usize, original_line: usize) -> Mapping {
        Mapping {
            generated_line,
            generated_column: 1,
            source: 0,
            original_line,
            original_column: 1,
            node_type: "assignment".to_owned(),
            symbol: Some("x".to_owned()),
            scope_id: None,
        }
    }

    #[test]
    fn test_compact_serialization() {
        let json = serde_json::to_string(&mapping(3, 2)).unwrap();
        assert_eq!(json, r#"[3,1,0,2,1,"assignment","x",null]"#);

        let back: Mapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping(3, 2));
    }

    #[test]
    fn test_bidirectional_lookup() {
        let mut map = SourceMap::new("a.sly");
        map.add_mapping(mapping(1, 10));
        map.add_mapping(mapping(2, 10));
        map.add_mapping(mapping(3, 11));

        assert_eq!(map.original_for(2).unwrap().original_line, 10);
        assert_eq!(map.generated_for(10).len(), 2);
        assert!(map.original_for(9).is_none());
    }

    #[test]
    fn test_names_and_breakpoints_accumulate() {
        let mut map = SourceMap::new("a.sly");
        map.add_mapping(mapping(1, 5));
        map.add_mapping(mapping(2, 5));
        map.sort();
        assert_eq!(map.names, vec!["x"]);
        assert_eq!(map.debug_info.breakpoint_lines, vec![5]);
    }
}
