//! Typed, schemed resource identifiers.
//!
//! A [`Uri`] is the only addressing mechanism shared by the UI, the content
//! loaders and the navigation history. The text form is
//! `scheme:/seg1/seg2?k1=v1&k2=v2#frag` (an optional `//authority` may follow
//! the scheme). Path segments, param values and the fragment are stored
//! percent-decoded; only [`Uri::to_encoded_string`] re-encodes them.
//!
//! Two URIs are compared along five independent axes, so the navigator can
//! tell "same document, different anchor" apart from "different document".

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;
use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::errors::{ThekeError, ThekeResult};

// ---------------------------------------------------------------------------
// Well-known path segments and params
// ---------------------------------------------------------------------------

pub const SEGM_APP: &str = "app";
pub const SEGM_ASSETS: &str = "assets";
pub const SEGM_BIBLE: &str = "bible";
pub const SEGM_BOOK: &str = "book";

pub const PARAM_SOURCE: &str = "source";
pub const PARAM_SOURCES: &str = "sources";

/// Separator used when several source names travel in one param.
pub const SOURCES_SEPARATOR: char = ';';

static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z][A-Za-z0-9+.\-]*):(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?$")
        .unwrap()
});

/// Characters escaped inside a single path segment. `/` is included so a
/// decoded segment holding a slash survives the round trip.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Characters escaped inside the authority.
const AUTHORITY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'`');

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// The closed set of schemes the application understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    /// In-app screens and asset paths.
    Internal,
    /// Documents served by the external backend (`/bible/…`, `/book/…`).
    ExternalDoc,
    /// Web pages, passed through untouched.
    Web,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Internal => "internal",
            Scheme::ExternalDoc => "external-doc",
            Scheme::Web => "web",
        }
    }
}

impl FromStr for Scheme {
    type Err = ThekeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Scheme::Internal),
            "external-doc" => Ok(Scheme::ExternalDoc),
            "web" => Ok(Scheme::Web),
            other => Err(ThekeError::MalformedUri(format!(
                "unsupported scheme `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Comparison mask
// ---------------------------------------------------------------------------

/// Result of [`Uri::compare`]: one bit per axis that matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Comparison(u8);

impl Comparison {
    pub const NOTHING_IN_COMMON: Self = Self(0);
    pub const SAME_SCHEME: Self = Self(1 << 0);
    pub const SAME_AUTHORITY: Self = Self(1 << 1);
    pub const SAME_PATH: Self = Self(1 << 2);
    pub const SAME_PARAMS: Self = Self(1 << 3);
    pub const SAME_FRAGMENT: Self = Self(1 << 4);

    pub const SAME_URI: Self = Self(0b1_1111);
    /// Everything matches except the fragment.
    pub const DIFFER_BY_FRAGMENT: Self = Self(0b0_1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Comparison {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Comparison {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Uri
// ---------------------------------------------------------------------------

/// An immutable resource identifier. Every `with_*` method returns a new
/// value; nothing mutates a `Uri` in place.
#[derive(Clone, Debug)]
pub struct Uri {
    scheme: Scheme,
    authority: String,
    path: Vec<String>,
    params: BTreeMap<String, String>,
    fragment: String,
}

impl Uri {
    /// Parse a raw URI string.
    ///
    /// Path segments and the fragment are percent-decoded eagerly; the query
    /// is split on `&` then `=` and both halves are decoded. Empty query
    /// tokens are ignored, a token without `=` is an error.
    pub fn parse(raw: &str) -> ThekeResult<Self> {
        let caps = URI_RE
            .captures(raw)
            .ok_or_else(|| ThekeError::MalformedUri(format!("cannot parse `{raw}`")))?;

        let scheme: Scheme = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .parse()?;
        let authority = caps
            .get(3)
            .map(|m| decode(m.as_str()))
            .transpose()?
            .unwrap_or_default();

        let raw_path = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
        let path = if raw_path.is_empty() {
            Vec::new()
        } else {
            raw_path.split('/').map(decode).collect::<ThekeResult<Vec<_>>>()?
        };

        let mut params = BTreeMap::new();
        if let Some(query) = caps.get(6) {
            for token in query.as_str().split('&').filter(|t| !t.is_empty()) {
                let (name, value) = token.split_once('=').ok_or_else(|| {
                    ThekeError::MalformedUri(format!("query token `{token}` lacks `=` in `{raw}`"))
                })?;
                params.insert(decode(name)?, decode(value)?);
            }
        }

        let fragment = caps
            .get(8)
            .map(|m| decode(m.as_str()))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            scheme,
            authority,
            path,
            params,
            fragment,
        })
    }

    /// Structured constructor: `segments` are taken as decoded values.
    ///
    /// By convention document paths start with an empty segment, so
    /// `["", "bible", "John 1"]` renders as `/bible/John 1`.
    pub fn build<I, S>(scheme: Scheme, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path: Vec<String> = segments.into_iter().map(Into::into).collect();
        if path.len() == 1 && path[0].is_empty() {
            path.clear();
        }
        Self {
            scheme,
            authority: String::new(),
            path,
            params: BTreeMap::new(),
            fragment: String::new(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        if !self.authority.is_empty() && self.path.first().is_some_and(|s| !s.is_empty()) {
            self.path.insert(0, String::new());
        }
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in params {
            self.params.insert(name.into(), value.into());
        }
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = fragment.into();
        self
    }

    /// Inject a list of source names under the `sources` param.
    /// An empty list removes the param.
    pub fn with_sources<S: AsRef<str>>(mut self, sources: &[S]) -> Self {
        if sources.is_empty() {
            self.params.remove(PARAM_SOURCES);
            return self;
        }
        let joined = sources
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(&SOURCES_SEPARATOR.to_string());
        self.params.insert(PARAM_SOURCES.to_string(), joined);
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.get(index).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Source names carried by the `sources` param, in order.
    pub fn sources(&self) -> Vec<String> {
        self.param(PARAM_SOURCES)
            .map(|raw| {
                raw.split(SOURCES_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_decoded_string(&self) -> String {
        self.render(false)
    }

    /// Encoded text form; `Uri::parse` of this string yields an equal URI.
    pub fn to_encoded_string(&self) -> String {
        self.render(true)
    }

    pub fn compare(&self, other: &Uri) -> Comparison {
        let mut mask = Comparison::NOTHING_IN_COMMON;
        if self.scheme == other.scheme {
            mask = mask | Comparison::SAME_SCHEME;
        }
        if self.authority == other.authority {
            mask = mask | Comparison::SAME_AUTHORITY;
        }
        if self.path == other.path {
            mask = mask | Comparison::SAME_PATH;
        }
        if self.params == other.params {
            mask = mask | Comparison::SAME_PARAMS;
        }
        if self.fragment == other.fragment {
            mask = mask | Comparison::SAME_FRAGMENT;
        }
        mask
    }

    fn render(&self, encode: bool) -> String {
        let mut out = String::from(self.scheme.as_str());
        out.push(':');

        if !self.authority.is_empty() {
            out.push_str("//");
            if encode {
                out.push_str(&utf8_percent_encode(&self.authority, AUTHORITY).to_string());
            } else {
                out.push_str(&self.authority);
            }
        }

        let segments: Vec<String> = self
            .path
            .iter()
            .map(|segment| {
                if encode {
                    utf8_percent_encode(segment, SEGMENT).to_string()
                } else {
                    segment.clone()
                }
            })
            .collect();
        out.push_str(&segments.join("/"));

        if !self.params.is_empty() {
            let pairs: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| {
                    if encode {
                        format!(
                            "{}={}",
                            utf8_percent_encode(name, QUERY),
                            utf8_percent_encode(value, QUERY)
                        )
                    } else {
                        format!("{name}={value}")
                    }
                })
                .collect();
            out.push('?');
            out.push_str(&pairs.join("&"));
        }

        if !self.fragment.is_empty() {
            out.push('#');
            if encode {
                out.push_str(&utf8_percent_encode(&self.fragment, FRAGMENT).to_string());
            } else {
                out.push_str(&self.fragment);
            }
        }

        out
    }
}

fn decode(raw: &str) -> ThekeResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ThekeError::MalformedUri(format!("invalid percent-encoding in `{raw}`: {e}")))
}

impl FromStr for Uri {
    type Err = ThekeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.to_encoded_string() == other.to_encoded_string()
    }
}

impl Eq for Uri {}

impl PartialEq<str> for Uri {
    fn eq(&self, other: &str) -> bool {
        self.to_encoded_string() == other
    }
}

impl PartialEq<&str> for Uri {
    fn eq(&self, other: &&str) -> bool {
        self.to_encoded_string() == *other
    }
}

impl Hash for Uri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_encoded_string().hash(state);
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decoded_string())
    }
}
