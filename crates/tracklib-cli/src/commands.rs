//! Command implementations
//!
//! Every command writes its output to the given writer; file access happens in [`run`].

use crate::import::{GpxImportConfig, gpx_to_track, read_gpx};
use crate::settings::{Command, SurfaceArgs};
use crate::Result;
use std::io::Write;
use tracklib::{DataType, FieldValue, TrackReader, read_track_file, write_track_file};
use tracklib_rwgps::{
    PolylineField, PolylineOptions, polyline_decode, section_column_simplified,
    section_data_polyline, section_data_simplified, section_data_simplified_polyline,
};

pub fn run(command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Import {
            input,
            output,
            precision_xy,
            precision_e,
            key,
        } => {
            let config = GpxImportConfig {
                precision_xy,
                precision_e,
            };
            let gpx = read_gpx(&input)?;
            let (metadata, sections) = gpx_to_track(&gpx, &config, key.as_bytes())?;
            write_track_file(&output, &metadata, &sections)?;
            tracing::info!(
                input = %input.display(),
                output = %output.display(),
                sections = sections.len(),
                "imported GPX file"
            );
            Ok(())
        }
        Command::Inspect { file } => {
            let buf = read_track_file(&file)?;
            inspect(&TrackReader::new(&buf)?, out)
        }
        Command::Polyline {
            file,
            section,
            fields,
            tolerance,
            surfaces,
            key,
        } => {
            let buf = read_track_file(&file)?;
            let reader = TrackReader::new(&buf)?;
            polyline(
                &reader,
                section,
                fields,
                tolerance,
                &surfaces,
                key.as_bytes(),
                out,
            )
        }
        Command::Simplify {
            file,
            section,
            tolerance,
            column,
            surfaces,
            key,
        } => {
            let buf = read_track_file(&file)?;
            let reader = TrackReader::new(&buf)?;
            simplify(
                &reader,
                section,
                tolerance,
                column.as_deref(),
                &surfaces,
                key.as_bytes(),
                out,
            )
        }
        Command::Decode {
            polyline,
            precisions,
        } => decode(&polyline, &precisions, out),
    }
}

fn describe(data_type: DataType) -> String {
    match data_type {
        DataType::F64 { precision: Some(p) } => format!("f64 (precision {p})"),
        DataType::F64 { precision: None } => "f64".to_string(),
        DataType::I64 => "i64".to_string(),
        DataType::U64 => "u64".to_string(),
        DataType::String => "string".to_string(),
    }
}

fn inspect(reader: &TrackReader<'_>, out: &mut impl Write) -> Result<()> {
    writeln!(out, "metadata:")?;
    for entry in reader.metadata() {
        writeln!(out, "  {} = {}", entry.key, entry.value)?;
    }

    for section in reader.sections() {
        writeln!(
            out,
            "section {}: {}, {} rows",
            section.index(),
            section.encoding(),
            section.rows()
        )?;
        for field in section.schema().fields() {
            writeln!(out, "  {}: {}", field.name(), describe(field.data_type()))?;
        }
    }
    Ok(())
}

fn polyline(
    reader: &TrackReader<'_>,
    section: usize,
    fields: Vec<PolylineField>,
    tolerance: Option<f64>,
    surfaces: &SurfaceArgs,
    key: Option<&[u8]>,
    out: &mut impl Write,
) -> Result<()> {
    let options = PolylineOptions::new(fields)?;
    let encoded = match tolerance {
        Some(tolerance) => section_data_simplified_polyline(
            reader,
            section,
            &surfaces.mapping(),
            tolerance,
            &options,
            key,
        )?,
        None => section_data_polyline(reader, section, &options, key)?,
    };
    writeln!(out, "{encoded}")?;
    Ok(())
}

fn simplify(
    reader: &TrackReader<'_>,
    section: usize,
    tolerance: f64,
    column: Option<&str>,
    surfaces: &SurfaceArgs,
    key: Option<&[u8]>,
    out: &mut impl Write,
) -> Result<()> {
    let mapping = surfaces.mapping();
    match column {
        Some(column) => {
            let values: Option<Vec<Option<FieldValue>>> =
                section_column_simplified(reader, section, column, &mapping, tolerance, key)?;
            if values.is_none() {
                tracing::warn!(column, "section has no such column");
            }
            serde_json::to_writer(&mut *out, &values)?;
        }
        None => {
            let rows = section_data_simplified(reader, section, &mapping, tolerance, key)?;
            serde_json::to_writer(&mut *out, &rows)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn decode(polyline: &str, precisions: &[u8], out: &mut impl Write) -> Result<()> {
    let values = polyline_decode(polyline, precisions)?;
    serde_json::to_writer(&mut *out, &values)?;
    writeln!(out)?;
    Ok(())
}
