//! Vertex-only OBJ export from PLY point clouds.
//!
//! Gaussian-splat outputs are point clouds with dozens of per-vertex
//! attributes (opacity, scale, rotation, spherical harmonics). Most mesh
//! viewers only need positions, so the export keeps `x y z` and drops the
//! rest. ASCII and both binary encodings are supported; the vertex element
//! must be the first element in the file.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use sf_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Scalar {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Scalar::I8,
            "uchar" | "uint8" => Scalar::U8,
            "short" | "int16" => Scalar::I16,
            "ushort" | "uint16" => Scalar::U16,
            "int" | "int32" => Scalar::I32,
            "uint" | "uint32" => Scalar::U32,
            "float" | "float32" => Scalar::F32,
            "double" | "float64" => Scalar::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Scalar::I8 | Scalar::U8 => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8], encoding: Encoding) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut arr = [0u8; $n];
                arr.copy_from_slice(&bytes[..$n]);
                match encoding {
                    Encoding::BinaryBigEndian => <$t>::from_be_bytes(arr) as f64,
                    _ => <$t>::from_le_bytes(arr) as f64,
                }
            }};
        }
        match self {
            Scalar::I8 => bytes[0] as i8 as f64,
            Scalar::U8 => bytes[0] as f64,
            Scalar::I16 => read!(i16, 2),
            Scalar::U16 => read!(u16, 2),
            Scalar::I32 => read!(i32, 4),
            Scalar::U32 => read!(u32, 4),
            Scalar::F32 => read!(f32, 4),
            Scalar::F64 => read!(f64, 8),
        }
    }
}

#[derive(Debug)]
struct Header {
    encoding: Encoding,
    vertex_count: usize,
    properties: Vec<(String, Scalar)>,
}

impl Header {
    fn index_of(&self, name: &str) -> Result<usize> {
        self.properties
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| malformed(format!("vertex element has no '{name}' property")))
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::tool("ply", message)
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<Header> {
    let mut line = String::new();
    let mut next_line = |reader: &mut R| -> Result<String> {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(malformed("unexpected end of file in header"));
        }
        Ok(line.trim().to_string())
    };

    if next_line(&mut *reader)? != "ply" {
        return Err(malformed("missing 'ply' magic"));
    }

    let mut encoding = None;
    let mut vertex_count = None;
    let mut properties = Vec::new();
    let mut in_vertex = false;
    let mut seen_element = false;

    loop {
        let l = next_line(&mut *reader)?;
        let mut parts = l.split_whitespace();
        match parts.next() {
            Some("format") => {
                encoding = Some(match parts.next() {
                    Some("ascii") => Encoding::Ascii,
                    Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                    Some("binary_big_endian") => Encoding::BinaryBigEndian,
                    other => return Err(malformed(format!("unsupported format {other:?}"))),
                });
            }
            Some("element") => {
                let name = parts.next().unwrap_or_default();
                if !seen_element && name != "vertex" {
                    return Err(malformed(format!(
                        "first element is '{name}', expected 'vertex'"
                    )));
                }
                in_vertex = name == "vertex";
                seen_element = true;
                if in_vertex {
                    let count = parts
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| malformed("vertex element has no count"))?;
                    vertex_count = Some(count);
                }
            }
            Some("property") if in_vertex => {
                let ty = parts.next().unwrap_or_default();
                if ty == "list" {
                    return Err(malformed("list properties on vertices are not supported"));
                }
                let scalar = Scalar::parse(ty)
                    .ok_or_else(|| malformed(format!("unknown property type '{ty}'")))?;
                let name = parts
                    .next()
                    .ok_or_else(|| malformed("property without a name"))?;
                properties.push((name.to_string(), scalar));
            }
            Some("end_header") => break,
            _ => {}
        }
    }

    Ok(Header {
        encoding: encoding.ok_or_else(|| malformed("missing format line"))?,
        vertex_count: vertex_count.ok_or_else(|| malformed("missing vertex element"))?,
        properties,
    })
}

/// Write the vertex positions of `ply` to `obj` as `v x y z` lines.
///
/// Returns the number of vertices written. The OBJ is written to a temp file
/// and renamed into place.
pub fn ply_to_obj(ply: &Path, obj: &Path) -> Result<usize> {
    let mut reader = BufReader::new(File::open(ply)?);
    let header = read_header(&mut reader)?;
    let (ix, iy, iz) = (
        header.index_of("x")?,
        header.index_of("y")?,
        header.index_of("z")?,
    );

    let dir = match obj.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    let mut out = BufWriter::new(tmp);
    writeln!(out, "# vertices: {}", header.vertex_count)?;

    match header.encoding {
        Encoding::Ascii => {
            let mut line = String::new();
            for i in 0..header.vertex_count {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(malformed(format!(
                        "expected {} vertices, found {i}",
                        header.vertex_count
                    )));
                }
                let fields: Vec<&str> = line.split_whitespace().collect();
                let get = |idx: usize| -> Result<f64> {
                    fields
                        .get(idx)
                        .and_then(|f| f.parse::<f64>().ok())
                        .ok_or_else(|| malformed(format!("bad vertex line {i}: {}", line.trim())))
                };
                writeln!(out, "v {} {} {}", get(ix)?, get(iy)?, get(iz)?)?;
            }
        }
        encoding => {
            let offsets: Vec<usize> = header
                .properties
                .iter()
                .scan(0, |acc, (_, s)| {
                    let off = *acc;
                    *acc += s.size();
                    Some(off)
                })
                .collect();
            let stride: usize = header.properties.iter().map(|(_, s)| s.size()).sum();
            let field = |record: &[u8], idx: usize| {
                let (_, scalar) = header.properties[idx];
                scalar.decode(&record[offsets[idx]..], encoding)
            };

            let mut record = vec![0u8; stride];
            for i in 0..header.vertex_count {
                reader.read_exact(&mut record).map_err(|_| {
                    malformed(format!(
                        "expected {} vertices, found {i}",
                        header.vertex_count
                    ))
                })?;
                writeln!(
                    out,
                    "v {} {} {}",
                    field(&record, ix),
                    field(&record, iy),
                    field(&record, iz)
                )?;
            }
        }
    }

    let tmp = out
        .into_inner()
        .map_err(|e| Error::Io { source: e.into_error() })?;
    tmp.persist(obj).map_err(|e| Error::Io { source: e.error })?;

    tracing::debug!(ply = %ply.display(), obj = %obj.display(), vertices = header.vertex_count, "Exported OBJ");
    Ok(header.vertex_count)
}
