//! Points and match conditions.
//!
//! A [`Point`] names a location inside an HTTP request. Every [`PointTag`] has
//! a fixed key arity, checked when a point is constructed, so a [`Condition`]
//! can never carry a key its tag does not accept.

use std::fmt;
use std::str::FromStr;

use wallarm_core::Error;

use crate::Result;

/// Key arity of a point tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// The tag takes no key
    Bare,
    /// The tag takes a string key
    Named,
    /// The tag takes an integer key
    Indexed,
}

macro_rules! point_tags {
    ($($variant:ident => ($name:literal, $wire:literal, $arity:ident),)+) => {
        /// Kind of request location a point refers to.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum PointTag {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl PointTag {
            /// Every known tag.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Name used in declarations.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// Name used on the wire.
            #[must_use]
            pub const fn wire_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Key arity of the tag.
            #[must_use]
            pub const fn arity(self) -> Arity {
                match self {
                    $(Self::$variant => Arity::$arity,)+
                }
            }

            /// Look up a tag by its wire name.
            #[must_use]
            pub fn from_wire(wire: &str) -> Option<Self> {
                match wire {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

point_tags! {
    ActionName => ("action_name", "action_name", Bare),
    ActionExt => ("action_ext", "action_ext", Bare),
    Method => ("method", "method", Bare),
    Proto => ("proto", "proto", Bare),
    Scheme => ("scheme", "scheme", Bare),
    Uri => ("uri", "uri", Bare),
    Instance => ("instance", "instance", Bare),
    Post => ("post", "post", Bare),
    JsonDoc => ("json_doc", "json_doc", Bare),
    Xml => ("xml", "xml", Bare),
    Base64 => ("base64", "base64", Bare),
    Gzip => ("gzip", "gzip", Bare),
    Htmljs => ("htmljs", "htmljs", Bare),
    Percent => ("percent", "percent", Bare),
    Viewstate => ("viewstate", "viewstate", Bare),
    Gql => ("gql", "gql", Bare),
    File => ("file", "file", Bare),
    HeaderAll => ("header_all", "header_all", Bare),
    HashAll => ("hash_all", "hash_all", Bare),
    ArrayAll => ("array_all", "array_all", Bare),
    GetAll => ("get_all", "get_all", Bare),
    CookieAll => ("cookie_all", "cookie_all", Bare),
    FormUrlencodedAll => ("form_urlencoded_all", "form_urlencoded_all", Bare),
    JsonObjAll => ("json_obj_all", "json_obj_all", Bare),
    JsonArrayAll => ("json_array_all", "json_array_all", Bare),
    Header => ("header", "header", Named),
    Query => ("query", "get", Named),
    Hash => ("hash", "hash", Named),
    Cookie => ("cookie", "cookie", Named),
    FormUrlencoded => ("form_urlencoded", "form_urlencoded", Named),
    Multipart => ("multipart", "multipart", Named),
    ContentDisp => ("content_disp", "content_disp", Named),
    JsonObj => ("json_obj", "json_obj", Named),
    Json => ("json", "json", Named),
    Jwt => ("jwt", "jwt", Named),
    Protobuf => ("protobuf", "protobuf", Named),
    XmlTag => ("xml_tag", "xml_tag", Named),
    XmlAttr => ("xml_attr", "xml_attr", Named),
    ResponseHeader => ("response_header", "response_header", Named),
    Path => ("path", "path", Indexed),
    Array => ("array", "array", Indexed),
    Grpc => ("grpc", "grpc", Indexed),
    JsonArray => ("json_array", "json_array", Indexed),
    XmlComment => ("xml_comment", "xml_comment", Indexed),
    XmlDtdEntity => ("xml_dtd_entity", "xml_dtd_entity", Indexed),
    XmlPi => ("xml_pi", "xml_pi", Indexed),
    XmlTagArray => ("xml_tag_array", "xml_tag_array", Indexed),
    ViewstateArray => ("viewstate_array", "viewstate_array", Indexed),
    ViewstateSparseArray => ("viewstate_sparse_array", "viewstate_sparse_array", Indexed),
    ViewstatePair => ("viewstate_pair", "viewstate_pair", Indexed),
    ViewstateTriplet => ("viewstate_triplet", "viewstate_triplet", Indexed),
    ViewstateDict => ("viewstate_dict", "viewstate_dict", Indexed),
}

impl PointTag {
    /// Tags whose matched value is carried in the condition value rather than
    /// in a key.
    #[must_use]
    pub const fn carries_value(self) -> bool {
        matches!(
            self,
            Self::ActionName
                | Self::ActionExt
                | Self::Method
                | Self::Proto
                | Self::Scheme
                | Self::Uri
                | Self::Instance
        )
    }
}

impl FromStr for PointTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.name() == s)
            .or_else(|| Self::from_wire(s))
            .ok_or_else(|| Error::InvalidCondition(format!("unknown point tag `{s}`")))
    }
}

impl fmt::Display for PointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request location: a tag plus the key its arity requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Point {
    /// Tag without a key
    Bare(PointTag),
    /// Tag with a string key
    Named(PointTag, String),
    /// Tag with an integer key
    Indexed(PointTag, i64),
}

impl Point {
    /// Build a point from a tag and an optional textual key.
    ///
    /// Keys of indexed tags are parsed as numbers and must be integral.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCondition`] if the key does not fit the tag's arity.
    pub fn new(tag: PointTag, key: Option<&str>) -> Result<Self> {
        match (tag.arity(), key) {
            (Arity::Bare, None) => Ok(Self::Bare(tag)),
            (Arity::Named, Some(key)) => Self::named(tag, key),
            (Arity::Indexed, Some(key)) => Self::indexed(tag, parse_index(key)?),
            (Arity::Bare, Some(key)) => Err(Error::InvalidCondition(format!(
                "point `{tag}` takes no key, got `{key}`"
            ))),
            (_, None) => Err(Error::InvalidCondition(format!(
                "point `{tag}` requires a key"
            ))),
        }
    }

    /// Build a point for a tag that takes no key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCondition`] if the tag requires a key.
    pub fn bare(tag: PointTag) -> Result<Self> {
        Self::new(tag, None)
    }

    /// Build a point for a string-keyed tag. Header names are upper-cased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCondition`] if the tag is not string-keyed.
    pub fn named(tag: PointTag, key: impl Into<String>) -> Result<Self> {
        if tag.arity() != Arity::Named {
            return Err(Error::InvalidCondition(format!(
                "point `{tag}` does not take a string key"
            )));
        }
        let key = key.into();
        let key = if tag == PointTag::Header {
            key.to_uppercase()
        } else {
            key
        };
        Ok(Self::Named(tag, key))
    }

    /// Build a point for an integer-keyed tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCondition`] if the tag is not integer-keyed.
    pub fn indexed(tag: PointTag, index: i64) -> Result<Self> {
        if tag.arity() != Arity::Indexed {
            return Err(Error::InvalidCondition(format!(
                "point `{tag}` does not take a numeric key"
            )));
        }
        Ok(Self::Indexed(tag, index))
    }

    /// The point's tag.
    #[must_use]
    pub const fn tag(&self) -> PointTag {
        match self {
            Self::Bare(tag) | Self::Named(tag, _) | Self::Indexed(tag, _) => *tag,
        }
    }

    /// The key rendered as text, if the point has one.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Bare(_) => None,
            Self::Named(_, key) => Some(key.clone()),
            Self::Indexed(_, index) => Some(index.to_string()),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare(tag) => write!(f, "{tag}"),
            Self::Named(tag, key) => write!(f, "{tag}:{key}"),
            Self::Indexed(tag, index) => write!(f, "{tag}:{index}"),
        }
    }
}

/// Parse a textual numeric key into an integer index.
///
/// Accepts float notation as long as the value is integral, so `"3"` and
/// `"3.0"` both yield `3`.
///
/// # Errors
///
/// Returns [`Error::InvalidCondition`] for non-numeric or fractional keys.
pub fn parse_index(key: &str) -> Result<i64> {
    let number: f64 = key
        .trim()
        .parse()
        .map_err(|_| Error::InvalidCondition(format!("`{key}` is not a numeric key")))?;
    index_from_f64(number)
        .ok_or_else(|| Error::InvalidCondition(format!("`{key}` is not an integral key")))
}

/// Convert a wire number into an integer index when it is integral.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn index_from_f64(number: f64) -> Option<i64> {
    let in_range = number >= i64::MIN as f64 && number <= i64::MAX as f64;
    (number.is_finite() && number.fract() == 0.0 && in_range).then_some(number as i64)
}

/// How a condition compares the request value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Comparison {
    /// Exact match
    #[default]
    Equal,
    /// Case-insensitive match
    Iequal,
    /// Regular expression match
    Regex,
    /// The location must be missing
    Absent,
}

impl Comparison {
    /// Name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Iequal => "iequal",
            Self::Regex => "regex",
            Self::Absent => "absent",
        }
    }
}

impl FromStr for Comparison {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equal" => Ok(Self::Equal),
            "iequal" => Ok(Self::Iequal),
            "regex" => Ok(Self::Regex),
            "absent" => Ok(Self::Absent),
            other => Err(Error::InvalidCondition(format!(
                "unknown comparison type `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One atomic match test: a point, a comparison and a value.
///
/// Construction normalizes the condition to the form the service stores, so
/// two conditions that the service treats as the same compare equal:
///
/// - `absent` drops the value
/// - `iequal` lower-cases the value and any non-header key
/// - `instance` always compares with `equal`
/// - an empty value is kept as given; only `absent` drops it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Condition {
    point: Point,
    comparison: Comparison,
    value: Option<String>,
}

impl Condition {
    /// Build a normalized condition.
    #[must_use]
    pub fn new(point: Point, comparison: Comparison, value: Option<String>) -> Self {
        let comparison = if point.tag() == PointTag::Instance {
            Comparison::Equal
        } else {
            comparison
        };

        let value = match comparison {
            Comparison::Absent => None,
            Comparison::Iequal => value.map(|v| v.to_lowercase()),
            Comparison::Equal | Comparison::Regex => value,
        };

        let point = match point {
            Point::Named(tag, key) if comparison == Comparison::Iequal && tag != PointTag::Header => {
                Point::Named(tag, key.to_lowercase())
            }
            other => other,
        };

        Self {
            point,
            comparison,
            value,
        }
    }

    /// Build a condition from textual parts, validating the key arity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCondition`] for an unknown tag or comparison, or
    /// a key that does not fit the tag.
    pub fn parse(tag: &str, key: Option<&str>, comparison: &str, value: Option<&str>) -> Result<Self> {
        let point = Point::new(tag.parse()?, key)?;
        Ok(Self::new(
            point,
            comparison.parse()?,
            value.map(str::to_string),
        ))
    }

    /// The request location.
    #[must_use]
    pub const fn point(&self) -> &Point {
        &self.point
    }

    /// The comparison type.
    #[must_use]
    pub const fn comparison(&self) -> Comparison {
        self.comparison
    }

    /// The compared value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} {value:?}", self.point, self.comparison),
            None => write!(f, "{} {}", self.point, self.comparison),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        assert_eq!("query".parse::<PointTag>().unwrap(), PointTag::Query);
        assert_eq!("get".parse::<PointTag>().unwrap(), PointTag::Query);
        assert_eq!(PointTag::from_wire("get"), Some(PointTag::Query));
        assert_eq!(PointTag::from_wire("query"), None);
        assert_eq!(PointTag::Query.wire_name(), "get");
        assert!("bogus".parse::<PointTag>().is_err());
    }

    #[test]
    fn test_every_tag_round_trips_through_wire_name() {
        for tag in PointTag::ALL {
            assert_eq!(PointTag::from_wire(tag.wire_name()), Some(*tag));
            assert_eq!(tag.name().parse::<PointTag>().unwrap(), *tag);
        }
    }

    #[test]
    fn test_point_arity_is_enforced() {
        assert!(Point::new(PointTag::Method, None).is_ok());
        assert!(Point::new(PointTag::Method, Some("GET")).is_err());
        assert!(Point::new(PointTag::Header, None).is_err());
        assert!(Point::new(PointTag::Path, Some("abc")).is_err());
        assert!(Point::new(PointTag::Path, Some("1.5")).is_err());
        assert!(Point::named(PointTag::Path, "1").is_err());
        assert!(Point::indexed(PointTag::Header, 1).is_err());
    }

    #[test]
    fn test_numeric_keys_are_canonical() {
        assert_eq!(
            Point::new(PointTag::Path, Some("3")).unwrap(),
            Point::Indexed(PointTag::Path, 3)
        );
        assert_eq!(
            Point::new(PointTag::Path, Some("3.0")).unwrap(),
            Point::Indexed(PointTag::Path, 3)
        );
        assert_eq!(
            Point::Indexed(PointTag::Path, 3).key().as_deref(),
            Some("3")
        );
        assert_eq!(index_from_f64(f64::NAN), None);
        assert_eq!(index_from_f64(-2.0), Some(-2));
    }

    #[test]
    fn test_header_key_is_upper_cased() {
        let point = Point::named(PointTag::Header, "x-login").unwrap();
        assert_eq!(point, Point::Named(PointTag::Header, "X-LOGIN".to_string()));
        assert_eq!(point.to_string(), "header:X-LOGIN");
    }

    #[test]
    fn test_condition_normalization() {
        let absent = Condition::parse("header", Some("host"), "absent", Some("x")).unwrap();
        assert_eq!(absent.value(), None);

        let iequal = Condition::parse("query", Some("UserId"), "iequal", Some("ABC")).unwrap();
        assert_eq!(iequal.point(), &Point::Named(PointTag::Query, "userid".into()));
        assert_eq!(iequal.value(), Some("abc"));

        let header = Condition::parse("header", Some("host"), "iequal", Some("Example.COM")).unwrap();
        assert_eq!(header.point(), &Point::Named(PointTag::Header, "HOST".into()));
        assert_eq!(header.value(), Some("example.com"));

        let instance = Condition::parse("instance", None, "regex", Some("7")).unwrap();
        assert_eq!(instance.comparison(), Comparison::Equal);

        let empty = Condition::parse("uri", None, "equal", Some("")).unwrap();
        assert_eq!(empty.value(), Some(""));

        let absent = Condition::parse("uri", None, "absent", Some("/x")).unwrap();
        assert_eq!(absent.value(), None);
    }

    #[test]
    fn test_condition_parse_rejects_bad_parts() {
        assert!(Condition::parse("header", None, "equal", Some("x")).is_err());
        assert!(Condition::parse("method", None, "fuzzy", Some("GET")).is_err());
        assert!(Condition::parse("nope", None, "equal", None).is_err());
    }
}
