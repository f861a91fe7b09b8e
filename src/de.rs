use std::str::FromStr;

use serde::de::{self, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{Error, ErrorKind, Result};
use crate::store::{KeyChain, Section};

// Deserializes a whole section as a map of key -> values.
pub(crate) struct SectionDeserializer<'de> {
    section: &'de Section,
}

impl<'de> SectionDeserializer<'de> {
    pub fn new(section: &'de Section) -> Self {
        SectionDeserializer { section }
    }
}

impl<'de> Deserializer<'de> for SectionDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        debug!("deserialize_map");
        let iter = Box::new(self.section.iter());
        visitor.visit_map(SectionAccess { iter, value: None })
    }

    // Struct fields are key names.
    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        debug!("deserialize_struct({})", _name);
        self.deserialize_map(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct seq tuple tuple_struct enum
        identifier ignored_any
    }
}

struct SectionAccess<'de> {
    iter: Box<dyn Iterator<Item = (&'de str, &'de KeyChain)> + 'de>,
    value: Option<(&'de str, &'de KeyChain)>,
}

impl<'de> MapAccess<'de> for SectionAccess<'de> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, chain)) => {
                self.value = Some((key, chain));
                seed.deserialize(key.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        match self.value.take() {
            Some((key, chain)) => seed.deserialize(ChainDeserializer { key, chain }),
            None => Err(Error::new(ErrorKind::Internal, "value requested before key")),
        }
    }
}

// All values of one key. Sequences see every value, anything else sees
// the first one.
struct ChainDeserializer<'de> {
    key: &'de str,
    chain: &'de KeyChain,
}

impl<'de> ChainDeserializer<'de> {
    fn first(&self) -> ValueDeserializer<'de> {
        ValueDeserializer { key: self.key, value: self.chain.first() }
    }
}

// Hand a scalar request to the deserializer of the first value.
macro_rules! forward_to_first {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                Deserializer::$method(self.first(), visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ChainDeserializer<'de> {
    type Error = Error;

    forward_to_first! {
        deserialize_any deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char
        deserialize_str deserialize_string deserialize_identifier
        deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_map deserialize_ignored_any
    }

    // A key that is present always has a value.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let key = self.key;
        let iter = Box::new(self.chain.values());
        visitor.visit_seq(ListAccess { key, iter })
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(self, _name: &'static str, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V>(self, name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.first().deserialize_unit_struct(name, visitor)
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.first().deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.first().deserialize_enum(name, variants, visitor)
    }
}

struct ListAccess<'de> {
    key: &'de str,
    iter: Box<dyn Iterator<Item = &'de str> + 'de>,
}

impl<'de> SeqAccess<'de> for ListAccess<'de> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDeserializer { key: self.key, value }).map(Some),
            None => Ok(None),
        }
    }
}

// One raw string value.
struct ValueDeserializer<'de> {
    key: &'de str,
    value: &'de str,
}

impl<'de> ValueDeserializer<'de> {
    fn parse_expr<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
    {
        FromStr::from_str(self.value.trim()).map_err(|_| {
            Error::new(ErrorKind::Value, format!("key '{}': expected {} value, got '{}'", self.key, name, self.value))
        })
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::new(ErrorKind::Value, format!("key '{}': cannot deserialize a {}", self.key, what))
    }
}

// The `parse_expr` function is generic over the result type. These
// methods only differ in the type and the visitor method.
macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident, $name:expr;)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value>
            where
                V: Visitor<'de>,
            {
                let value = self.parse_expr($name)?;
                visitor.$visit(value)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for ValueDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.value)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let v = match self.value.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "t" | "true" | "on" | "1" => true,
            "n" | "no" | "f" | "false" | "off" | "0" => false,
            _ => {
                return Err(Error::new(
                    ErrorKind::Value,
                    format!("key '{}': expected boolean value, got '{}'", self.key, self.value),
                ))
            }
        };
        visitor.visit_bool(v)
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8, "i8 integer";
        deserialize_i16 => visit_i16, "i16 integer";
        deserialize_i32 => visit_i32, "i32 integer";
        deserialize_i64 => visit_i64, "i64 integer";
        deserialize_u8 => visit_u8, "u8 integer";
        deserialize_u16 => visit_u16, "u16 integer";
        deserialize_u32 => visit_u32, "u32 integer";
        deserialize_u64 => visit_u64, "u64 integer";
        deserialize_f32 => visit_f32, "f32 float";
        deserialize_f64 => visit_f64, "f64 float";
        deserialize_char => visit_char, "single character";
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.value)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.value)
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_str(self.value)
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_bytes(self.value.as_bytes())
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_borrowed_bytes(self.value.as_bytes())
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    // A single value as a one-element sequence.
    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let key = self.key;
        let iter = Box::new(std::iter::once(self.value));
        visitor.visit_seq(ListAccess { key, iter })
    }

    fn deserialize_tuple<V>(self, _len: usize, _visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(self.unsupported("tuple"))
    }

    fn deserialize_tuple_struct<V>(self, _name: &'static str, _len: usize, _visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(self.unsupported("tuple struct"))
    }

    fn deserialize_map<V>(self, _visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(self.unsupported("map"))
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(self.unsupported("struct"))
    }

    // Only unit variants: `workers = threads`.
    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_enum(self.value.trim().into_deserializer())
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }
}
