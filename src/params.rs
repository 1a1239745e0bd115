//! Query parameter collection and serialization
//!
//! `QueryParams` is an ordered multimap of string pairs. Values enter it
//! through the `QueryValue` trait, which is the single place where typed
//! option values are turned into query-string text:
//!
//! * strings are passed through verbatim
//! * integers and floats use their `Display` form
//! * booleans become `1` or `0`
//! * `None` and empty lists are omitted entirely
//! * lists are joined with commas

use url::form_urlencoded;

/// Converts a typed value into its query-string representation.
///
/// Returning `None` means the parameter is left out of the request.
pub trait QueryValue {
    fn to_query_value(&self) -> Option<String>;
}

impl QueryValue for str {
    fn to_query_value(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl QueryValue for String {
    fn to_query_value(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl QueryValue for bool {
    fn to_query_value(&self) -> Option<String> {
        Some(if *self { "1" } else { "0" }.to_string())
    }
}

macro_rules! display_query_value {
    ($($ty:ty),*) => {
        $(
            impl QueryValue for $ty {
                fn to_query_value(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

display_query_value!(u8, u16, u32, u64, usize, i32, i64, f64);

impl<T: QueryValue + ?Sized> QueryValue for &T {
    fn to_query_value(&self) -> Option<String> {
        (**self).to_query_value()
    }
}

impl<T: QueryValue> QueryValue for Option<T> {
    fn to_query_value(&self) -> Option<String> {
        self.as_ref().and_then(QueryValue::to_query_value)
    }
}

impl<T: QueryValue> QueryValue for [T] {
    fn to_query_value(&self) -> Option<String> {
        let parts: Vec<String> = self.iter().filter_map(QueryValue::to_query_value).collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(","))
        }
    }
}

impl<T: QueryValue> QueryValue for Vec<T> {
    fn to_query_value(&self) -> Option<String> {
        self.as_slice().to_query_value()
    }
}

/// Ordered multimap of query parameters for a single request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Creates an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, skipping it when the value serializes to nothing
    pub fn append<V: QueryValue + ?Sized>(&mut self, key: &str, value: &V) -> &mut Self {
        if let Some(value) = value.to_query_value() {
            self.pairs.push((key.to_string(), value));
        }
        self
    }

    /// Builder-style variant of [`QueryParams::append`]
    pub fn with<V: QueryValue + ?Sized>(mut self, key: &str, value: &V) -> Self {
        self.append(key, value);
        self
    }

    /// Returns the first value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether at least one value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Iterates over the pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs, counting repeated keys separately
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no parameter has been added
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Form-urlencodes the parameters in insertion order
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// Form-urlencodes the parameters sorted by key, then value.
    ///
    /// Two collections holding the same pairs produce the same string
    /// regardless of insertion order.
    pub fn to_sorted_query_string(&self) -> String {
        let mut sorted: Vec<&(String, String)> = self.pairs.iter().collect();
        sorted.sort();
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
