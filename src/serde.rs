//! Hosts-file entries may be written as a one-line `[user@]host[:port]`
//! string or as a `hostname`/`user`/`port` mapping. Both shapes deserialize
//! into the same type.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{self, value::MapAccessDeserializer, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use void::{ResultVoidExt, Void};

/// For `#[serde(deserialize_with)]` on a hosts-file entry: a string goes
/// through `T::from_str`, a mapping through `T`'s own `Deserialize`.
///
/// `from_str` cannot fail here. Host strings are checked afterwards by
/// [`ConnectionSpec::parse`](crate::host::ConnectionSpec::parse).
pub fn string_or_mapping<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Deserialize<'de> + FromStr<Err = Void>,
    D: Deserializer<'de>,
{
    struct EntryVisitor<T>(PhantomData<fn() -> T>);

    impl<'de, T> Visitor<'de> for EntryVisitor<T>
    where
        T: Deserialize<'de> + FromStr<Err = Void>,
    {
        type Value = T;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a host string or a mapping with `hostname`")
        }

        fn visit_str<E>(self, value: &str) -> Result<T, E>
        where
            E: de::Error,
        {
            Ok(T::from_str(value).void_unwrap())
        }

        fn visit_map<M>(self, map: M) -> Result<T, M::Error>
        where
            M: MapAccess<'de>,
        {
            T::deserialize(MapAccessDeserializer::new(map))
        }
    }

    deserializer.deserialize_any(EntryVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        hostname: String,
        port: Option<u16>,
    }

    impl FromStr for Entry {
        type Err = Void;

        fn from_str(s: &str) -> Result<Self, Void> {
            Ok(Entry {
                hostname: s.to_string(),
                port: None,
            })
        }
    }

    #[derive(Debug, Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "string_or_mapping")] Entry);

    #[test]
    fn test_both_shapes() {
        let Wrapped(short) = serde_yaml::from_str("root@web:2222").unwrap();
        assert_eq!(short.hostname, "root@web:2222");
        assert_eq!(short.port, None);

        let Wrapped(long) = serde_yaml::from_str("hostname: web\nport: 2222").unwrap();
        assert_eq!(
            long,
            Entry {
                hostname: "web".to_string(),
                port: Some(2222)
            }
        );
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(serde_yaml::from_str::<Wrapped>("[web, db]").is_err());
    }
}
