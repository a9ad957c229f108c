use std::str::FromStr;

use super::error::TypeError;

/// Query string pairs in request order. Keys may repeat (`?tags=a&tags=b`).
pub type FormData = Vec<(String, String)>;

#[derive(Debug, Clone, Default)]
pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            None | Some("") => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid value for {key}"))),
        }
    }

    /// Boolean query flags accept `1`/`true` and `0`/`false`.
    pub fn get_flag(&self, key: &str) -> Result<bool, TypeError> {
        match self.get_str(key) {
            None | Some("") => Ok(false),
            Some("1") | Some("true") | Some("True") => Ok(true),
            Some("0") | Some("false") | Some("False") => Ok(false),
            Some(_) => Err(TypeError::new(&format!("Invalid value for {key}"))),
        }
    }

    /// Re-encodes the query with `key` replaced by `value`.
    pub fn with_value(&self, key: &str, value: &str) -> String {
        let mut pairs: Vec<(&str, &str)> = self
            .inner
            .iter()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.push((key, value));

        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
