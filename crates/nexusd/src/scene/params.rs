//! Parameter parsing shared by the scene executors.
//!
//! Planners are loose about shapes, so vectors arrive either as JSON arrays
//! or as `"(x, y, z)"` strings and colours as names, lists or JSON text.

use nexus_protocol::Params;
use nexus_rpc::ExecutorError;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use url::Url;

/// Three floats: a location, a rotation in degrees or a scale.
pub type Vector3 = [f64; 3];

/// Linear RGBA colour.
pub type Rgba = [f64; 4];

const NAMED_COLOURS: &[(&str, Rgba)] = &[
    ("RED", [1.0, 0.0, 0.0, 1.0]),
    ("GREEN", [0.0, 1.0, 0.0, 1.0]),
    ("BLUE", [0.0, 0.0, 1.0, 1.0]),
    ("WHITE", [1.0, 1.0, 1.0, 1.0]),
    ("BLACK", [0.0, 0.0, 0.0, 1.0]),
    ("YELLOW", [1.0, 1.0, 0.0, 1.0]),
    ("ORANGE", [1.0, 0.5, 0.0, 1.0]),
    ("PURPLE", [0.5, 0.0, 0.5, 1.0]),
    ("CYAN", [0.0, 1.0, 1.0, 1.0]),
    ("MAGENTA", [1.0, 0.0, 1.0, 1.0]),
    ("LIME", [0.5, 1.0, 0.0, 1.0]),
    ("PINK", [1.0, 0.75, 0.8, 1.0]),
    ("BROWN", [0.6, 0.4, 0.2, 1.0]),
    ("NAVY", [0.0, 0.0, 0.5, 1.0]),
    ("TEAL", [0.0, 0.5, 0.5, 1.0]),
    ("SILVER", [0.75, 0.75, 0.75, 1.0]),
    ("GRAY", [0.5, 0.5, 0.5, 1.0]),
];

/// Mesh primitives `create_primitive` can add.
///
/// The title-case label doubles as the base object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
pub enum Primitive {
    /// Cube.
    #[default]
    Cube,
    /// UV sphere.
    Sphere,
    /// Cylinder.
    Cylinder,
    /// Cone.
    Cone,
    /// Plane.
    Plane,
    /// Torus.
    Torus,
}

/// The mandatory `name` parameter.
pub(super) fn name(params: &Params) -> Result<&str, ExecutorError> {
    params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutorError::invalid_params("missing 'name' parameter"))
}

/// Reads an optional parameter, treating `null` as absent.
fn optional<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|value| !value.is_null())
}

/// A mandatory vector parameter.
pub(super) fn vector(params: &Params, key: &str) -> Result<Vector3, ExecutorError> {
    optional_vector(params, key)?
        .ok_or_else(|| ExecutorError::invalid_params(format!("missing '{key}' parameter")))
}

/// An optional vector parameter; present but malformed is an error.
pub(super) fn optional_vector(params: &Params, key: &str) -> Result<Option<Vector3>, ExecutorError> {
    let Some(value) = optional(params, key) else {
        return Ok(None);
    };
    parse_vector(value)
        .map(Some)
        .ok_or_else(|| ExecutorError::invalid_params(format!("'{key}' is not a vector: {value}")))
}

/// A scale: a vector or one number applied to every axis.
pub(super) fn scale(params: &Params) -> Result<Vector3, ExecutorError> {
    match optional(params, "scale") {
        Some(Value::Number(number)) => number
            .as_f64()
            .map(|factor| [factor; 3])
            .ok_or_else(|| ExecutorError::invalid_params("'scale' is not a number")),
        _ => vector(params, "scale"),
    }
}

/// The primitive size: a number or the first element of a list, default 1.
pub(super) fn size(params: &Params) -> Result<f64, ExecutorError> {
    let Some(value) = optional(params, "size") else {
        return Ok(1.0);
    };
    let number = match value {
        Value::Array(items) => items.first().and_then(Value::as_f64),
        other => other.as_f64(),
    };
    number.ok_or_else(|| ExecutorError::invalid_params(format!("'size' is not a number: {value}")))
}

/// The primitive shape, default cube.
pub(super) fn shape(params: &Params) -> Result<Primitive, ExecutorError> {
    match optional(params, "shape") {
        None => Ok(Primitive::default()),
        Some(Value::String(text)) => text
            .trim()
            .parse()
            .map_err(|_| ExecutorError::invalid_params(format!("unsupported shape '{text}'"))),
        Some(other) => Err(ExecutorError::invalid_params(format!(
            "'shape' is not a string: {other}"
        ))),
    }
}

/// A glTF asset named by the `url` parameter of `import_asset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// The parsed link.
    pub url: Url,
    /// File name without its extension; the base name of the imported object.
    pub stem: String,
}

/// The mandatory `url` parameter, which must link to a `.glb` or `.gltf` file.
pub(super) fn asset(params: &Params) -> Result<Asset, ExecutorError> {
    let text = optional(params, "url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ExecutorError::invalid_params("URL parameter is missing."))?;
    let url = Url::parse(text)
        .map_err(|error| ExecutorError::invalid_params(format!("'{text}' is not a URL: {error}")))?;
    let file = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let stem = file
        .rsplit_once('.')
        .filter(|(stem, extension)| {
            !stem.is_empty()
                && (extension.eq_ignore_ascii_case("glb") || extension.eq_ignore_ascii_case("gltf"))
        })
        .map(|(stem, _)| stem.to_owned())
        .ok_or_else(|| {
            ExecutorError::invalid_params(format!("'{text}' does not link to a .glb or .gltf file"))
        })?;
    Ok(Asset { url, stem })
}

/// The mandatory `color` parameter.
pub(super) fn colour(params: &Params) -> Result<Rgba, ExecutorError> {
    let value = optional(params, "color")
        .ok_or_else(|| ExecutorError::invalid_params("missing 'color' parameter"))?;
    parse_colour(value)
        .ok_or_else(|| ExecutorError::invalid_params(format!("unrecognised colour: {value}")))
}

fn parse_vector(value: &Value) -> Option<Vector3> {
    match value {
        Value::Array(items) => {
            let [x, y, z] = items.as_slice() else {
                return None;
            };
            Some([x.as_f64()?, y.as_f64()?, z.as_f64()?])
        }
        Value::String(text) => {
            let stripped: String = text.chars().filter(|c| !matches!(c, '(' | ')')).collect();
            let parts = stripped
                .split(',')
                .map(|part| part.trim().parse::<f64>().ok())
                .collect::<Option<Vec<_>>>()?;
            parts.try_into().ok()
        }
        _ => None,
    }
}

fn parse_colour(value: &Value) -> Option<Rgba> {
    match value {
        Value::Array(items) => colour_from_list(items),
        Value::String(text) if text.trim_start().starts_with('[') => {
            let normalised = text.replace('\'', "\"");
            match serde_json::from_str::<Value>(&normalised).ok()? {
                Value::Array(items) => colour_from_list(&items),
                _ => None,
            }
        }
        Value::String(text) => {
            let upper = text.trim().to_ascii_uppercase();
            NAMED_COLOURS
                .iter()
                .find(|(colour_name, _)| *colour_name == upper)
                .map(|(_, rgba)| *rgba)
        }
        _ => None,
    }
}

fn colour_from_list(items: &[Value]) -> Option<Rgba> {
    let channels = items
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()?;
    match channels.as_slice() {
        [r, g, b] => Some([*r, *g, *b, 1.0]),
        [r, g, b, a] => Some([*r, *g, *b, *a]),
        _ => None,
    }
}
