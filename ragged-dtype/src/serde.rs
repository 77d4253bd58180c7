//! `serde` support for [`Form`], going through its canonical JSON mapping.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::Form;

impl Serialize for Form {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Form {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Form::from_json(&value).map_err(|e| D::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use crate::{Form, FormKind, IndexType, PType};

    #[test]
    fn string_round_trip() {
        let form = Form::new(FormKind::IndexedOption {
            index: IndexType::I64,
            content: Box::new(Form::new(FormKind::Numpy {
                primitive: PType::Bool,
            })),
        });
        let text = serde_json::to_string(&form).unwrap();
        let back: Form = serde_json::from_str(&text).unwrap();
        assert_eq!(back, form);
    }
}
