use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracklib_rwgps::{PolylineField, SurfaceMapping, SurfaceTypeId};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// tracklib - Import, inspect and query columnar GPS track files
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a GPX file into a track file, one section per GPX track
    Import {
        /// GPX file to read
        #[clap(value_name = "GPX")]
        input: PathBuf,

        /// Track file to write
        #[clap(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Decimal digits kept for longitude and latitude
        #[clap(long, default_value = "7")]
        precision_xy: u8,

        /// Decimal digits kept for elevation
        #[clap(long, default_value = "1")]
        precision_e: u8,

        #[clap(flatten)]
        key: KeyArgs,
    },

    /// Print the metadata and the section index of a track file
    Inspect {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },

    /// Encode a section as a polyline, optionally simplified first
    Polyline {
        #[clap(value_name = "FILE")]
        file: PathBuf,

        /// Section index
        #[clap(short, long, default_value = "0")]
        section: usize,

        /// Field to encode as NAME:PRECISION[:DEFAULT], in output order ("d" = distance)
        #[clap(
            short,
            long = "field",
            value_name = "FIELD",
            required = true,
            value_parser = parse_polyline_field
        )]
        fields: Vec<PolylineField>,

        /// Simplify with this Douglas-Peucker tolerance (degrees) before encoding
        #[clap(short, long)]
        tolerance: Option<f64>,

        #[clap(flatten)]
        surfaces: SurfaceArgs,

        #[clap(flatten)]
        key: KeyArgs,
    },

    /// Print the rows (or one column) that survive simplification, as JSON
    Simplify {
        #[clap(value_name = "FILE")]
        file: PathBuf,

        /// Section index
        #[clap(short, long, default_value = "0")]
        section: usize,

        /// Douglas-Peucker tolerance in degrees
        #[clap(short, long, default_value = "0.0")]
        tolerance: f64,

        /// Only print this column
        #[clap(short, long)]
        column: Option<String>,

        #[clap(flatten)]
        surfaces: SurfaceArgs,

        #[clap(flatten)]
        key: KeyArgs,
    },

    /// Decode a polyline into a flat JSON array of numbers
    Decode {
        polyline: String,

        /// Precision of each field, in encoding order
        #[clap(short, long = "precision", value_name = "PRECISION", required = true)]
        precisions: Vec<u8>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// 32-byte key for encrypted sections
    #[clap(long, env = "TRACKLIB_KEY", hide_env_values = true)]
    pub key: Option<String>,
}

impl KeyArgs {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.key.as_deref().map(str::as_bytes)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SurfaceArgs {
    /// Surface id that means "unknown surface"
    #[clap(long, default_value = "99")]
    pub unknown_surface: SurfaceTypeId,

    /// Surface group as ID:GROUP; runs of different groups are simplified separately
    #[clap(long = "surface", value_name = "ID:GROUP", value_parser = parse_surface_group)]
    pub surfaces: Vec<(SurfaceTypeId, String)>,
}

impl SurfaceArgs {
    pub fn mapping(&self) -> SurfaceMapping {
        let mut mapping = SurfaceMapping::new(self.unknown_surface);
        for (id, group) in &self.surfaces {
            mapping.add_surface(*id, group.clone());
        }
        mapping
    }
}

fn parse_polyline_field(arg: &str) -> Result<PolylineField, String> {
    let mut parts = arg.split(':');
    let name = parts
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("missing field name in '{arg}'"))?;
    let precision = parts
        .next()
        .ok_or_else(|| format!("missing precision in '{arg}'"))?
        .parse::<u8>()
        .map_err(|e| format!("invalid precision in '{arg}': {e}"))?;

    let field = PolylineField::new(name, precision);
    let field = match parts.next() {
        Some(default) => field.with_default(
            default
                .parse::<f64>()
                .map_err(|e| format!("invalid default in '{arg}': {e}"))?,
        ),
        None => field,
    };

    if parts.next().is_some() {
        return Err(format!("expected NAME:PRECISION[:DEFAULT], got '{arg}'"));
    }
    Ok(field)
}

fn parse_surface_group(arg: &str) -> Result<(SurfaceTypeId, String), String> {
    let (id, group) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected ID:GROUP, got '{arg}'"))?;
    let id = id
        .parse::<SurfaceTypeId>()
        .map_err(|e| format!("invalid surface id in '{arg}': {e}"))?;
    Ok((id, group.to_string()))
}
