//! Typed payload values stored as objects and attributes.

use std::collections::BTreeMap;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use murmur3::MurmurHash;

use crate::core::Interpolate;
use crate::util::{BBox3d, DMat4, DVec3, Error, Result};

/// A typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    V3d(DVec3),
    Box3d(BBox3d),
    M44d(DMat4),
    FloatArray(Vec<f64>),
    IntArray(Vec<i64>),
    StringArray(Vec<String>),
    /// Point positions; the only array type with a local bound.
    V3dArray(Vec<DVec3>),
    Compound(BTreeMap<String, Data>),
}

impl Data {
    /// Type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::V3d(_) => "V3d",
            Self::Box3d(_) => "Box3d",
            Self::M44d(_) => "M44d",
            Self::FloatArray(_) => "FloatArray",
            Self::IntArray(_) => "IntArray",
            Self::StringArray(_) => "StringArray",
            Self::V3dArray(_) => "V3dArray",
            Self::Compound(_) => "Compound",
        }
    }

    fn type_code(&self) -> u8 {
        match self {
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::String(_) => 4,
            Self::V3d(_) => 5,
            Self::Box3d(_) => 6,
            Self::M44d(_) => 7,
            Self::FloatArray(_) => 8,
            Self::IntArray(_) => 9,
            Self::StringArray(_) => 10,
            Self::V3dArray(_) => 11,
            Self::Compound(_) => 12,
        }
    }

    /// Local bound of boundable payloads.
    pub fn bound(&self) -> Option<BBox3d> {
        match self {
            Self::Box3d(b) => Some(*b),
            Self::V3dArray(points) => Some(BBox3d::from_points(points)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Self::StringArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&BTreeMap<String, Data>> {
        match self {
            Self::Compound(m) => Some(m),
            _ => None,
        }
    }

    /// Content hash.
    pub fn hash(&self, h: &mut MurmurHash) {
        h.append_bytes(&[self.type_code()]);
        match self {
            Self::Bool(v) => {
                h.append_bytes(&[*v as u8]);
            }
            Self::Int(v) => {
                h.append_i64(*v);
            }
            Self::Float(v) => {
                h.append_f64(*v);
            }
            Self::String(s) => {
                h.append_str(s);
            }
            Self::V3d(v) => {
                h.append_f64_slice(&v.to_array());
            }
            Self::Box3d(b) => {
                h.append_f64_slice(&b.min.to_array()).append_f64_slice(&b.max.to_array());
            }
            Self::M44d(m) => {
                h.append_f64_slice(&m.to_cols_array());
            }
            Self::FloatArray(v) => {
                h.append_f64_slice(v);
            }
            Self::IntArray(v) => {
                h.append_u64(v.len() as u64);
                for x in v {
                    h.append_i64(*x);
                }
            }
            Self::StringArray(v) => {
                h.append_u64(v.len() as u64);
                for s in v {
                    h.append_str(s);
                }
            }
            Self::V3dArray(v) => {
                let flat: &[f64] = bytemuck::cast_slice(v);
                h.append_f64_slice(flat);
            }
            Self::Compound(m) => {
                h.append_u64(m.len() as u64);
                for (k, v) in m {
                    h.append_str(k);
                    v.hash(h);
                }
            }
        }
    }

    /// Serialize to bytes (type code followed by the payload).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.type_code());
        // Writes into a Vec cannot fail.
        match self {
            Self::Bool(v) => out.push(*v as u8),
            Self::Int(v) => {
                let _ = out.write_i64::<LittleEndian>(*v);
            }
            Self::Float(v) => {
                let _ = out.write_f64::<LittleEndian>(*v);
            }
            Self::String(s) => write_str(out, s),
            Self::V3d(v) => write_f64s(out, &v.to_array()),
            Self::Box3d(b) => {
                write_f64s(out, &b.min.to_array());
                write_f64s(out, &b.max.to_array());
            }
            Self::M44d(m) => write_f64s(out, &m.to_cols_array()),
            Self::FloatArray(v) => {
                write_len(out, v.len());
                write_f64s(out, v);
            }
            Self::IntArray(v) => {
                write_len(out, v.len());
                for x in v {
                    let _ = out.write_i64::<LittleEndian>(*x);
                }
            }
            Self::StringArray(v) => {
                write_len(out, v.len());
                for s in v {
                    write_str(out, s);
                }
            }
            Self::V3dArray(v) => {
                write_len(out, v.len());
                write_f64s(out, bytemuck::cast_slice(v));
            }
            Self::Compound(m) => {
                write_len(out, m.len());
                for (k, v) in m {
                    write_str(out, k);
                    v.encode(out);
                }
            }
        }
    }

    /// Deserialize a value produced by [`Data::encode`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = data;
        let value = Self::decode_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::invalid(format!("{} trailing bytes after value", cursor.len())));
        }
        Ok(value)
    }

    fn decode_from(r: &mut &[u8]) -> Result<Self> {
        let code = r.read_u8().map_err(eof)?;
        Ok(match code {
            1 => Self::Bool(r.read_u8().map_err(eof)? != 0),
            2 => Self::Int(r.read_i64::<LittleEndian>().map_err(eof)?),
            3 => Self::Float(r.read_f64::<LittleEndian>().map_err(eof)?),
            4 => Self::String(read_str(r)?),
            5 => Self::V3d(read_v3d(r)?),
            6 => {
                let min = read_v3d(r)?;
                let max = read_v3d(r)?;
                Self::Box3d(BBox3d::new(min, max))
            }
            7 => {
                let mut cols = [0.0; 16];
                read_f64s(r, &mut cols)?;
                Self::M44d(DMat4::from_cols_array(&cols))
            }
            8 => {
                let n = read_len(r)?;
                let mut v = vec![0.0; n];
                read_f64s(r, &mut v)?;
                Self::FloatArray(v)
            }
            9 => {
                let n = read_len(r)?;
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(r.read_i64::<LittleEndian>().map_err(eof)?);
                }
                Self::IntArray(v)
            }
            10 => {
                let n = read_len(r)?;
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(read_str(r)?);
                }
                Self::StringArray(v)
            }
            11 => {
                let n = read_len(r)?;
                let mut v = vec![DVec3::ZERO; n];
                read_f64s(r, bytemuck::cast_slice_mut(&mut v))?;
                Self::V3dArray(v)
            }
            12 => {
                let n = read_len(r)?;
                let mut m = BTreeMap::new();
                for _ in 0..n {
                    let k = read_str(r)?;
                    m.insert(k, Self::decode_from(r)?);
                }
                Self::Compound(m)
            }
            _ => return Err(Error::invalid(format!("unknown data type code {}", code))),
        })
    }
}

fn eof(_: std::io::Error) -> Error {
    Error::UnexpectedEof(0)
}

fn write_len(out: &mut Vec<u8>, n: usize) {
    let _ = out.write_u64::<LittleEndian>(n as u64);
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn write_f64s(out: &mut Vec<u8>, v: &[f64]) {
    for x in v {
        let _ = out.write_f64::<LittleEndian>(*x);
    }
}

fn read_len(r: &mut &[u8]) -> Result<usize> {
    let n = r.read_u64::<LittleEndian>().map_err(eof)? as usize;
    // A length can never exceed the remaining bytes; guards allocation on corrupt input.
    if n > r.len() {
        return Err(Error::UnexpectedEof(n as u64));
    }
    Ok(n)
}

fn read_str(r: &mut &[u8]) -> Result<String> {
    let n = read_len(r)?;
    let (s, rest) = r.split_at(n);
    *r = rest;
    String::from_utf8(s.to_vec()).map_err(|e| Error::invalid(e.to_string()))
}

fn read_f64s(r: &mut &[u8], out: &mut [f64]) -> Result<()> {
    r.read_f64_into::<LittleEndian>(out).map_err(eof)
}

fn read_v3d(r: &mut &[u8]) -> Result<DVec3> {
    let mut v = [0.0; 3];
    read_f64s(r, &mut v)?;
    Ok(DVec3::from_array(v))
}

fn lerp_slices(a: &[f64], b: &[f64], t: f64) -> Result<Vec<f64>> {
    if a.len() != b.len() {
        return Err(Error::SampleMismatch(format!("{} elements vs {}", a.len(), b.len())));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x + (y - x) * t).collect())
}

impl Interpolate for Data {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Result<Option<Self>> {
        Ok(Some(match (a, b) {
            (Self::Float(x), Self::Float(y)) => Self::Float(x + (y - x) * t),
            (Self::V3d(x), Self::V3d(y)) => Self::V3d(x.lerp(*y, t)),
            (Self::Box3d(x), Self::Box3d(y)) => Self::Box3d(x.lerp(y, t)),
            (Self::M44d(x), Self::M44d(y)) => {
                let v = lerp_slices(&x.to_cols_array(), &y.to_cols_array(), t)?;
                let mut cols = [0.0; 16];
                cols.copy_from_slice(&v);
                Self::M44d(DMat4::from_cols_array(&cols))
            }
            (Self::FloatArray(x), Self::FloatArray(y)) => Self::FloatArray(lerp_slices(x, y, t)?),
            (Self::V3dArray(x), Self::V3dArray(y)) => {
                if x.len() != y.len() {
                    return Err(Error::SampleMismatch(format!("{} points vs {}", x.len(), y.len())));
                }
                Self::V3dArray(x.iter().zip(y).map(|(p, q)| p.lerp(*q, t)).collect())
            }
            (Self::Compound(x), Self::Compound(y)) => {
                if x.len() != y.len() || x.keys().zip(y.keys()).any(|(k1, k2)| k1 != k2) {
                    return Err(Error::SampleMismatch("compound members differ".into()));
                }
                let mut out = BTreeMap::new();
                for ((k, vx), vy) in x.iter().zip(y.values()) {
                    let v = match Self::interpolate(vx, vy, t)? {
                        Some(v) => v,
                        None => vx.clone(),
                    };
                    out.insert(k.clone(), v);
                }
                Self::Compound(out)
            }
            _ if a.type_code() != b.type_code() => {
                return Err(Error::SampleMismatch(format!("{} vs {}", a.type_name(), b.type_name())));
            }
            _ => return Ok(None),
        }))
    }
}
