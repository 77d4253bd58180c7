use std::fmt::{Display, Formatter};

use itertools::Itertools;
use ragged_error::{RaggedResult, ragged_bail, ragged_err};
use serde_json::{Map, Value, json};

use crate::{IndexType, PType, Parameters};

/// The data-free schema of a layout tree.
///
/// A `Form` mirrors the node taxonomy of a layout: node kind, index types, structural
/// attributes and parameters, but no buffers and no lengths. Two layouts with equal forms have
/// the same type.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    kind: FormKind,
    parameters: Parameters,
    form_key: Option<String>,
}

/// The node-specific part of a [`Form`].
#[derive(Debug, Clone, PartialEq)]
pub enum FormKind {
    /// An array with no elements and no type.
    Empty,
    /// A leaf of primitive values.
    Numpy {
        /// The element type
        primitive: PType,
    },
    /// Pure indirection through an index.
    Indexed {
        /// Type of the index buffer
        index: IndexType,
        /// The referenced content
        content: Box<Form>,
    },
    /// Indirection where a negative index means missing.
    IndexedOption {
        /// Type of the index buffer
        index: IndexType,
        /// The referenced content
        content: Box<Form>,
    },
    /// One mask byte per element.
    ByteMasked {
        /// Type of the mask buffer
        mask: IndexType,
        /// The mask value meaning "valid"
        valid_when: bool,
        /// The masked content
        content: Box<Form>,
    },
    /// One mask bit per element.
    BitMasked {
        /// Type of the mask buffer
        mask: IndexType,
        /// The bit value meaning "valid"
        valid_when: bool,
        /// Whether bits are numbered from the least significant end
        lsb_order: bool,
        /// The masked content
        content: Box<Form>,
    },
    /// Option type with every element valid.
    Unmasked {
        /// The wrapped content
        content: Box<Form>,
    },
    /// Variable-length lists described by one offsets buffer.
    ListOffset {
        /// Type of the offsets buffer
        offsets: IndexType,
        /// The list elements
        content: Box<Form>,
    },
    /// Variable-length lists described by starts and stops.
    List {
        /// Type of the starts buffer
        starts: IndexType,
        /// Type of the stops buffer
        stops: IndexType,
        /// The list elements
        content: Box<Form>,
    },
    /// Fixed-size lists.
    Regular {
        /// Number of elements per list
        size: usize,
        /// The list elements
        content: Box<Form>,
    },
    /// Records (named fields) or tuples (positional fields).
    Record {
        /// One form per field
        contents: Vec<Form>,
        /// Field names, `None` for tuples
        fields: Option<Vec<String>>,
    },
    /// Tagged union of several contents.
    Union {
        /// Type of the tags buffer
        tags: IndexType,
        /// Type of the index buffer
        index: IndexType,
        /// One form per alternative
        contents: Vec<Form>,
    },
}

impl Form {
    /// Create a form with no parameters and no form key.
    pub fn new(kind: FormKind) -> Self {
        Self {
            kind,
            parameters: Parameters::empty(),
            form_key: None,
        }
    }

    /// Replace the parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Replace the form key.
    pub fn with_form_key(mut self, form_key: Option<String>) -> Self {
        self.form_key = form_key;
        self
    }

    /// The node-specific description.
    pub fn kind(&self) -> &FormKind {
        &self.kind
    }

    /// Parameters of the node.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Key under which the node's buffers are stored, if assigned.
    pub fn form_key(&self) -> Option<&str> {
        self.form_key.as_deref()
    }

    /// Name of the layout class this form describes.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            FormKind::Empty => "EmptyArray",
            FormKind::Numpy { .. } => "NumpyArray",
            FormKind::Indexed { .. } => "IndexedArray",
            FormKind::IndexedOption { .. } => "IndexedOptionArray",
            FormKind::ByteMasked { .. } => "ByteMaskedArray",
            FormKind::BitMasked { .. } => "BitMaskedArray",
            FormKind::Unmasked { .. } => "UnmaskedArray",
            FormKind::ListOffset { .. } => "ListOffsetArray",
            FormKind::List { .. } => "ListArray",
            FormKind::Regular { .. } => "RegularArray",
            FormKind::Record { .. } => "RecordArray",
            FormKind::Union { .. } => "UnionArray",
        }
    }

    /// Child forms, in order.
    pub fn children(&self) -> Vec<&Form> {
        match &self.kind {
            FormKind::Empty | FormKind::Numpy { .. } => vec![],
            FormKind::Indexed { content, .. }
            | FormKind::IndexedOption { content, .. }
            | FormKind::ByteMasked { content, .. }
            | FormKind::BitMasked { content, .. }
            | FormKind::Unmasked { content }
            | FormKind::ListOffset { content, .. }
            | FormKind::List { content, .. }
            | FormKind::Regular { content, .. } => vec![content.as_ref()],
            FormKind::Record { contents, .. } | FormKind::Union { contents, .. } => {
                contents.iter().collect()
            }
        }
    }

    /// Render the canonical nested mapping: `class`, the variant-specific fields, nested
    /// `content`/`contents`, and `parameters`/`form_key` when present.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("class".into(), json!(self.class_name()));
        match &self.kind {
            FormKind::Empty => {}
            FormKind::Numpy { primitive } => {
                out.insert("primitive".into(), json!(primitive.name()));
            }
            FormKind::Indexed { index, content } | FormKind::IndexedOption { index, content } => {
                out.insert("index".into(), json!(index.name()));
                out.insert("content".into(), content.to_json());
            }
            FormKind::ByteMasked {
                mask,
                valid_when,
                content,
            } => {
                out.insert("mask".into(), json!(mask.name()));
                out.insert("valid_when".into(), json!(valid_when));
                out.insert("content".into(), content.to_json());
            }
            FormKind::BitMasked {
                mask,
                valid_when,
                lsb_order,
                content,
            } => {
                out.insert("mask".into(), json!(mask.name()));
                out.insert("valid_when".into(), json!(valid_when));
                out.insert("lsb_order".into(), json!(lsb_order));
                out.insert("content".into(), content.to_json());
            }
            FormKind::Unmasked { content } => {
                out.insert("content".into(), content.to_json());
            }
            FormKind::ListOffset { offsets, content } => {
                out.insert("offsets".into(), json!(offsets.name()));
                out.insert("content".into(), content.to_json());
            }
            FormKind::List {
                starts,
                stops,
                content,
            } => {
                out.insert("starts".into(), json!(starts.name()));
                out.insert("stops".into(), json!(stops.name()));
                out.insert("content".into(), content.to_json());
            }
            FormKind::Regular { size, content } => {
                out.insert("size".into(), json!(size));
                out.insert("content".into(), content.to_json());
            }
            FormKind::Record { contents, fields } => {
                out.insert(
                    "contents".into(),
                    Value::Array(contents.iter().map(Form::to_json).collect()),
                );
                out.insert("fields".into(), json!(fields));
            }
            FormKind::Union {
                tags,
                index,
                contents,
            } => {
                out.insert("tags".into(), json!(tags.name()));
                out.insert("index".into(), json!(index.name()));
                out.insert(
                    "contents".into(),
                    Value::Array(contents.iter().map(Form::to_json).collect()),
                );
            }
        }
        if !self.parameters.is_empty() {
            out.insert("parameters".into(), self.parameters.to_json());
        }
        if let Some(form_key) = &self.form_key {
            out.insert("form_key".into(), json!(form_key));
        }
        Value::Object(out)
    }

    /// Parse the mapping produced by [`Form::to_json`].
    pub fn from_json(value: &Value) -> RaggedResult<Form> {
        let Value::Object(map) = value else {
            ragged_bail!(Serde: "expected a form object, found {}", value);
        };
        let class = str_field(map, "class")?;
        let content = || -> RaggedResult<Box<Form>> {
            Ok(Box::new(Form::from_json(field(map, "content")?)?))
        };
        let contents = || -> RaggedResult<Vec<Form>> {
            match field(map, "contents")? {
                Value::Array(items) => items.iter().map(Form::from_json).try_collect(),
                other => ragged_bail!(Serde: "contents must be a list, found {}", other),
            }
        };
        let index_type = |key: &str| -> RaggedResult<IndexType> {
            IndexType::from_name(str_field(map, key)?)
        };
        let flag = |key: &str| -> RaggedResult<bool> {
            field(map, key)?
                .as_bool()
                .ok_or_else(|| ragged_err!(Serde: "{} must be a boolean", key))
        };

        let kind = match class {
            "EmptyArray" => FormKind::Empty,
            "NumpyArray" => FormKind::Numpy {
                primitive: PType::from_name(str_field(map, "primitive")?)?,
            },
            "IndexedArray" => FormKind::Indexed {
                index: index_type("index")?,
                content: content()?,
            },
            "IndexedOptionArray" => FormKind::IndexedOption {
                index: index_type("index")?,
                content: content()?,
            },
            "ByteMaskedArray" => FormKind::ByteMasked {
                mask: index_type("mask")?,
                valid_when: flag("valid_when")?,
                content: content()?,
            },
            "BitMaskedArray" => FormKind::BitMasked {
                mask: index_type("mask")?,
                valid_when: flag("valid_when")?,
                lsb_order: flag("lsb_order")?,
                content: content()?,
            },
            "UnmaskedArray" => FormKind::Unmasked {
                content: content()?,
            },
            "ListOffsetArray" => FormKind::ListOffset {
                offsets: index_type("offsets")?,
                content: content()?,
            },
            "ListArray" => FormKind::List {
                starts: index_type("starts")?,
                stops: index_type("stops")?,
                content: content()?,
            },
            "RegularArray" => FormKind::Regular {
                size: field(map, "size")?
                    .as_u64()
                    .ok_or_else(|| ragged_err!(Serde: "size must be a non-negative integer"))?
                    as usize,
                content: content()?,
            },
            "RecordArray" => FormKind::Record {
                contents: contents()?,
                fields: match map.get("fields") {
                    None | Some(Value::Null) => None,
                    Some(Value::Array(names)) => Some(
                        names
                            .iter()
                            .map(|n| {
                                n.as_str().map(str::to_string).ok_or_else(
                                    || ragged_err!(Serde: "field names must be strings"),
                                )
                            })
                            .try_collect()?,
                    ),
                    Some(other) => ragged_bail!(Serde: "invalid fields {}", other),
                },
            },
            "UnionArray" => FormKind::Union {
                tags: index_type("tags")?,
                index: index_type("index")?,
                contents: contents()?,
            },
            other => ragged_bail!(Serde: "unknown form class {}", other),
        };

        let parameters = match map.get("parameters") {
            None | Some(Value::Null) => Parameters::empty(),
            Some(Value::Object(p)) => Parameters::from_json(p),
            Some(other) => ragged_bail!(Serde: "invalid parameters {}", other),
        };
        let form_key = match map.get("form_key") {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(key.clone()),
            Some(other) => ragged_bail!(Serde: "invalid form_key {}", other),
        };
        Ok(Form {
            kind,
            parameters,
            form_key,
        })
    }
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> RaggedResult<&'a Value> {
    map.get(key)
        .ok_or_else(|| ragged_err!(Serde: "form is missing the {} field", key))
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> RaggedResult<&'a str> {
    field(map, key)?
        .as_str()
        .ok_or_else(|| ragged_err!(Serde: "form field {} must be a string", key))
}

impl Display for Form {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn floats() -> Form {
        Form::new(FormKind::Numpy {
            primitive: PType::F64,
        })
    }

    #[test]
    fn byte_masked_rendering() {
        let form = Form::new(FormKind::ByteMasked {
            mask: IndexType::I8,
            valid_when: false,
            content: Box::new(Form::new(FormKind::ListOffset {
                offsets: IndexType::I64,
                content: Box::new(floats()),
            })),
        });
        assert_eq!(
            form.to_json(),
            json!({
                "class": "ByteMaskedArray",
                "mask": "i8",
                "valid_when": false,
                "content": {
                    "class": "ListOffsetArray",
                    "offsets": "i64",
                    "content": {"class": "NumpyArray", "primitive": "float64"},
                },
            })
        );
        assert_eq!(Form::from_json(&form.to_json()).unwrap(), form);
    }

    #[test]
    fn equality_covers_structural_attributes() {
        let masked = |valid_when| {
            Form::new(FormKind::ByteMasked {
                mask: IndexType::I8,
                valid_when,
                content: Box::new(floats()),
            })
        };
        assert_eq!(masked(true), masked(true));
        assert_ne!(masked(true), masked(false));
        assert_ne!(
            floats(),
            floats().with_parameters(Parameters::empty().with("__doc__", "x"))
        );
        assert_ne!(floats(), floats().with_form_key(Some("node0".into())));
    }

    #[test]
    fn records_and_unions_parse() {
        let value = json!({
            "class": "UnionArray",
            "tags": "i8",
            "index": "i64",
            "contents": [
                {"class": "RecordArray", "contents": [{"class": "EmptyArray"}], "fields": ["x"]},
                {"class": "RegularArray", "size": 3, "content": {"class": "NumpyArray", "primitive": "int32"},
                 "parameters": {"__doc__": "triples"}, "form_key": "node4"},
            ],
        });
        let form = Form::from_json(&value).unwrap();
        assert_eq!(form.class_name(), "UnionArray");
        assert_eq!(form.children().len(), 2);
        assert_eq!(form.children()[1].form_key(), Some("node4"));
        assert_eq!(form.to_json(), value);
    }

    #[test]
    fn malformed_forms_are_rejected() {
        assert!(Form::from_json(&json!({"class": "NumpyArray"})).is_err());
        assert!(Form::from_json(&json!({"class": "Bogus"})).is_err());
        assert!(Form::from_json(&json!([1, 2])).is_err());
    }
}
