//! Command-line interface for gmlstream

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use serde::Serialize;
#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use gmlstream::geometry::CoordinateFormatter;
#[cfg(feature = "cli")]
use gmlstream::schema::xsd::decode_app_schema;
#[cfg(feature = "cli")]
use gmlstream::{Crs, GmlObject, GmlStreamReader, GmlStreamWriter, GmlVersion, QName, ReaderConfig, WriterConfig};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "gmlstream")]
#[command(author, version, about = "GML reading, conversion and inspection tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Path to the GML document
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Reader configuration (JSON)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// GML application schema (XSD)
    #[arg(short, long, value_name = "XSD")]
    schema: Option<PathBuf>,

    /// GML version of the input, overrides the configuration
    #[arg(short = 'f', long = "from")]
    from: Option<GmlVersion>,

    /// Downgrade structural errors to warnings
    #[arg(long)]
    lax: bool,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the root GML object of a document and summarize it
    Inspect {
        #[command(flatten)]
        input: InputArgs,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Read a GML document and write its root object in another GML version
    Convert {
        #[command(flatten)]
        input: InputArgs,

        /// GML version to write
        #[arg(short, long, default_value = "3.2")]
        to: GmlVersion,

        /// Maximum number of fraction digits per ordinate
        #[arg(short, long)]
        precision: Option<usize>,

        /// Nested feature levels written inline
        #[arg(long)]
        xlink_depth: Option<u32>,

        /// Output CRS
        #[arg(long)]
        srs: Option<String>,

        /// Indentation width
        #[arg(long)]
        indent: Option<usize>,

        /// Property to keep on top-level features, in Clark notation ({ns}local); repeatable
        #[arg(long = "property", value_name = "QNAME")]
        properties: Vec<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Determine the GML version of a MIME type
    Negotiate {
        /// MIME type, e.g. 'text/xml; subtype=gml/3.1.1'
        #[arg(value_name = "MIME")]
        mime_type: String,

        /// Version used when the MIME type names none
        #[arg(short, long, default_value = "3.2")]
        default: GmlVersion,
    },
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { input, json } => cmd_inspect(input, json),
        Commands::Convert {
            input,
            to,
            precision,
            xlink_depth,
            srs,
            indent,
            properties,
            output,
        } => cmd_convert(input, to, precision, xlink_depth, srs, indent, properties, output),
        Commands::Negotiate { mime_type, default } => cmd_negotiate(&mime_type, default),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn reader_config(input: &InputArgs) -> Result<ReaderConfig, Box<dyn std::error::Error>> {
    let mut config = match &input.config {
        Some(path) => ReaderConfig::from_file(path)?,
        None => ReaderConfig::default(),
    };
    if let Some(version) = input.from {
        config = config.with_version(version);
    }
    if input.lax {
        config = config.with_lax(true);
    }
    if let Some(path) = &input.schema {
        let xsd = fs::read_to_string(path)?;
        config = config.with_schema(decode_app_schema(&xsd)?);
    }
    Ok(config)
}

#[cfg(feature = "cli")]
fn read_root(input: &InputArgs) -> Result<(GmlObject, Vec<String>), Box<dyn std::error::Error>> {
    let config = reader_config(input)?;
    let mut reader = GmlStreamReader::from_file(&input.file, config)?;
    let object = reader.read()?;
    let dangling = reader.close();
    Ok((object, dangling))
}

#[cfg(feature = "cli")]
#[derive(Serialize, Debug)]
struct Summary {
    kind: &'static str,
    element: Option<String>,
    id: Option<String>,
    properties: usize,
    members: usize,
    geometry: Option<String>,
    dangling_references: Vec<String>,
}

#[cfg(feature = "cli")]
fn summarize(object: &GmlObject, dangling: Vec<String>) -> Summary {
    let mut summary = Summary {
        kind: "",
        element: None,
        id: object.id().map(str::to_string),
        properties: 0,
        members: 0,
        geometry: None,
        dangling_references: dangling,
    };
    match object {
        GmlObject::Feature(feature) => {
            summary.kind = "feature";
            summary.element = Some(feature.name.to_string());
            summary.properties = feature.properties.len();
        }
        GmlObject::FeatureCollection(collection) => {
            summary.kind = "feature collection";
            summary.element = Some(collection.name.to_string());
            summary.properties = collection.properties.len();
            summary.members = collection.len();
        }
        GmlObject::Geometry(geometry) => {
            summary.kind = "geometry";
            summary.geometry = Some(format!("{:?}", geometry.kind()));
        }
        GmlObject::Definition(definition) => {
            summary.kind = "definition";
            summary.element = Some(definition.name.to_string());
        }
        GmlObject::Dictionary(dictionary) => {
            summary.kind = "dictionary";
            summary.element = Some(dictionary.definition.name.to_string());
            summary.members = dictionary.len();
        }
    }
    summary
}

#[cfg(feature = "cli")]
fn cmd_inspect(input: InputArgs, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (object, dangling) = read_root(&input)?;
    let summary = summarize(&object, dangling);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("gmlstream v{}", gmlstream::VERSION);
    println!();
    println!("Kind: {}", summary.kind);
    if let Some(element) = &summary.element {
        println!("  Element: {}", element);
    }
    if let Some(id) = &summary.id {
        println!("  Id: {}", id);
    }
    if let Some(geometry) = &summary.geometry {
        println!("  Geometry: {}", geometry);
    }
    println!("  Properties: {}", summary.properties);
    println!("  Members: {}", summary.members);
    if summary.dangling_references.is_empty() {
        println!("  Dangling references: none");
    } else {
        println!("  Dangling references:");
        for href in &summary.dangling_references {
            println!("    {}", href);
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_convert(
    input: InputArgs,
    to: GmlVersion,
    precision: Option<usize>,
    xlink_depth: Option<u32>,
    srs: Option<String>,
    indent: Option<usize>,
    properties: Vec<String>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (object, dangling) = read_root(&input)?;
    for href in &dangling {
        eprintln!("warning: unresolved reference {}", href);
    }

    let formatter = precision
        .map(CoordinateFormatter::with_precision)
        .unwrap_or_default();
    let mut config = WriterConfig::new(to)
        .with_formatter(formatter)
        .with_xlink_depth(xlink_depth)
        .with_output_crs(srs.map(Crs::new))
        .with_indent(indent)
        .with_declaration(true);
    if !properties.is_empty() {
        let names = properties
            .iter()
            .map(|p| QName::from_clark(p))
            .collect::<Result<Vec<_>, _>>()?;
        config = config.with_projection(names);
    }

    let mut buffer = Vec::new();
    {
        let mut writer = GmlStreamWriter::new(&mut buffer, config);
        writer.write(&object)?;
        writer.finish()?;
    }

    match output {
        Some(path) => fs::write(path, &buffer)?,
        None => println!("{}", String::from_utf8(buffer)?),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_negotiate(mime_type: &str, default: GmlVersion) -> Result<(), Box<dyn std::error::Error>> {
    let version = GmlVersion::from_mime_type(mime_type, default);
    println!("Version: {}", version);
    println!("  Namespace: {}", version.namespace());
    println!("  MIME type: {}", version.mime_type());
    println!("  MIME type (old style): {}", version.mime_type_old_style());
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
    std::process::exit(1);
}
