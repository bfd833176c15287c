//! Transforms as ordered lists of named operations.
//!
//! A transform sample is kept decomposed so that animated transforms
//! interpolate channel by channel (a rotation angle sweeps instead of the
//! matrix entries blending). Interpolating two samples requires the same
//! op layout; anything else is a data error.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use murmur3::MurmurHash;

use crate::core::Interpolate;
use crate::util::{DMat4, DVec3, Error, Result};

/// Transform operation type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XformOpType {
    Scale,
    Translate,
    /// axis (x, y, z) + angle in degrees
    Rotate,
    RotateX,
    RotateY,
    RotateZ,
    /// 16 channels, column-major
    Matrix,
}

impl XformOpType {
    /// Operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Translate => "translate",
            Self::Rotate => "rotate",
            Self::RotateX => "rotateX",
            Self::RotateY => "rotateY",
            Self::RotateZ => "rotateZ",
            Self::Matrix => "matrix",
        }
    }

    /// Number of channels the operation carries.
    pub fn num_channels(&self) -> usize {
        match self {
            Self::Scale | Self::Translate => 3,
            Self::Rotate => 4,
            Self::RotateX | Self::RotateY | Self::RotateZ => 1,
            Self::Matrix => 16,
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::Scale => 0,
            Self::Translate => 1,
            Self::Rotate => 2,
            Self::Matrix => 3,
            Self::RotateX => 4,
            Self::RotateY => 5,
            Self::RotateZ => 6,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Scale),
            1 => Some(Self::Translate),
            2 => Some(Self::Rotate),
            3 => Some(Self::Matrix),
            4 => Some(Self::RotateX),
            5 => Some(Self::RotateY),
            6 => Some(Self::RotateZ),
            _ => None,
        }
    }
}

/// A single transform operation.
#[derive(Clone, Debug, PartialEq)]
pub struct XformOp {
    pub op_type: XformOpType,
    pub values: Vec<f64>,
}

impl XformOp {
    /// Create a scale operation.
    pub fn scale(x: f64, y: f64, z: f64) -> Self {
        Self { op_type: XformOpType::Scale, values: vec![x, y, z] }
    }

    /// Create a translate operation.
    pub fn translate(x: f64, y: f64, z: f64) -> Self {
        Self { op_type: XformOpType::Translate, values: vec![x, y, z] }
    }

    /// Create an axis-angle rotation (angle in degrees).
    pub fn rotate(axis: DVec3, angle: f64) -> Self {
        Self { op_type: XformOpType::Rotate, values: vec![axis.x, axis.y, axis.z, angle] }
    }

    /// Create a rotation around X axis (angle in degrees).
    pub fn rotate_x(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateX, values: vec![angle] }
    }

    /// Create a rotation around Y axis (angle in degrees).
    pub fn rotate_y(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateY, values: vec![angle] }
    }

    /// Create a rotation around Z axis (angle in degrees).
    pub fn rotate_z(angle: f64) -> Self {
        Self { op_type: XformOpType::RotateZ, values: vec![angle] }
    }

    /// Create a 4x4 matrix operation.
    pub fn matrix(m: &DMat4) -> Self {
        Self { op_type: XformOpType::Matrix, values: m.to_cols_array().to_vec() }
    }

    /// Matrix for this operation alone.
    pub fn to_matrix(&self) -> Result<DMat4> {
        let v = &self.values;
        if v.len() != self.op_type.num_channels() {
            return Err(Error::SampleMismatch(format!(
                "{} op has {} channels, expected {}",
                self.op_type.name(),
                v.len(),
                self.op_type.num_channels()
            )));
        }
        Ok(match self.op_type {
            XformOpType::Scale => DMat4::from_scale(DVec3::new(v[0], v[1], v[2])),
            XformOpType::Translate => DMat4::from_translation(DVec3::new(v[0], v[1], v[2])),
            XformOpType::Rotate => {
                let axis = DVec3::new(v[0], v[1], v[2]).normalize_or_zero();
                if axis.length_squared() > 0.0 {
                    DMat4::from_axis_angle(axis, v[3].to_radians())
                } else {
                    DMat4::IDENTITY
                }
            }
            XformOpType::RotateX => DMat4::from_rotation_x(v[0].to_radians()),
            XformOpType::RotateY => DMat4::from_rotation_y(v[0].to_radians()),
            XformOpType::RotateZ => DMat4::from_rotation_z(v[0].to_radians()),
            XformOpType::Matrix => {
                let mut cols = [0.0; 16];
                cols.copy_from_slice(v);
                DMat4::from_cols_array(&cols)
            }
        })
    }
}

/// Transform sample: operations applied in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transform {
    pub ops: Vec<XformOp>,
}

impl Transform {
    /// Identity transform (no ops).
    pub fn identity() -> Self {
        Self::default()
    }

    /// Single matrix op.
    pub fn from_matrix(m: &DMat4) -> Self {
        Self { ops: vec![XformOp::matrix(m)] }
    }

    /// Single translate op.
    pub fn from_translation(t: DVec3) -> Self {
        Self { ops: vec![XformOp::translate(t.x, t.y, t.z)] }
    }

    /// Builder-style op append.
    pub fn with(mut self, op: XformOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Compose the ops into a single matrix.
    pub fn matrix(&self) -> Result<DMat4> {
        let mut result = DMat4::IDENTITY;
        for op in &self.ops {
            result *= op.to_matrix()?;
        }
        Ok(result)
    }

    pub fn hash(&self, h: &mut MurmurHash) {
        h.append_u64(self.ops.len() as u64);
        for op in &self.ops {
            h.append_str(op.op_type.name());
            h.append_f64_slice(&op.values);
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        let _ = out.write_u32::<LittleEndian>(self.ops.len() as u32);
        for op in &self.ops {
            out.push(op.op_type.code());
            let _ = out.write_u32::<LittleEndian>(op.values.len() as u32);
            for v in &op.values {
                let _ = out.write_f64::<LittleEndian>(*v);
            }
        }
    }

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let eof = |_| Error::UnexpectedEof(0);
        let num_ops = data.read_u32::<LittleEndian>().map_err(eof)? as usize;
        // Every op takes at least a code byte and a value count.
        if num_ops > data.len() / 5 {
            return Err(Error::UnexpectedEof(num_ops as u64));
        }
        let mut ops = Vec::with_capacity(num_ops);
        for _ in 0..num_ops {
            let code = data.read_u8().map_err(eof)?;
            let op_type = XformOpType::from_code(code)
                .ok_or_else(|| Error::invalid(format!("unknown transform op code {}", code)))?;
            let n = data.read_u32::<LittleEndian>().map_err(eof)? as usize;
            if n > data.len() / 8 {
                return Err(Error::UnexpectedEof(n as u64));
            }
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(data.read_f64::<LittleEndian>().map_err(eof)?);
            }
            ops.push(XformOp { op_type, values });
        }
        Ok(Self { ops })
    }
}

impl Interpolate for Transform {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Result<Option<Self>> {
        if a.ops.len() != b.ops.len() {
            return Err(Error::SampleMismatch(format!(
                "{} ops vs {} ops",
                a.ops.len(),
                b.ops.len()
            )));
        }
        let mut ops = Vec::with_capacity(a.ops.len());
        for (i, (oa, ob)) in a.ops.iter().zip(&b.ops).enumerate() {
            if oa.op_type != ob.op_type {
                return Err(Error::SampleMismatch(format!(
                    "op {} is {} vs {}",
                    i,
                    oa.op_type.name(),
                    ob.op_type.name()
                )));
            }
            if oa.values.len() != ob.values.len() {
                return Err(Error::SampleMismatch(format!(
                    "op {} ({}) has {} channels vs {}",
                    i,
                    oa.op_type.name(),
                    oa.values.len(),
                    ob.values.len()
                )));
            }
            let values = oa.values.iter().zip(&ob.values).map(|(x, y)| x + (y - x) * t).collect();
            ops.push(XformOp { op_type: oa.op_type, values });
        }
        Ok(Some(Self { ops }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(Transform::identity().matrix().unwrap(), DMat4::IDENTITY);
        let s = Transform::identity().with(XformOp::scale(1.0, 1.0, 1.0));
        assert_eq!(s.matrix().unwrap(), DMat4::IDENTITY);
    }

    #[test]
    fn test_rotation() {
        let t = Transform::identity().with(XformOp::rotate_z(90.0));
        let v = t.matrix().unwrap().transform_vector3(DVec3::X);
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_channels() {
        let a = Transform::identity().with(XformOp::translate(0.0, 0.0, 0.0)).with(XformOp::rotate_z(0.0));
        let b = Transform::identity().with(XformOp::translate(10.0, 0.0, 0.0)).with(XformOp::rotate_z(90.0));
        let mid = Transform::interpolate(&a, &b, 0.5).unwrap().unwrap();
        assert_eq!(mid.ops[0].values, vec![5.0, 0.0, 0.0]);
        assert_eq!(mid.ops[1].values, vec![45.0]);
    }

    #[test]
    fn test_interpolate_mismatch() {
        let a = Transform::identity().with(XformOp::translate(0.0, 0.0, 0.0));
        let b = a.clone().with(XformOp::rotate_x(1.0));
        assert!(matches!(Transform::interpolate(&a, &b, 0.5), Err(Error::SampleMismatch(_))));

        let c = Transform::identity().with(XformOp::scale(1.0, 1.0, 1.0));
        assert!(matches!(Transform::interpolate(&a, &c, 0.5), Err(Error::SampleMismatch(_))));

        let d = Transform { ops: vec![XformOp { op_type: XformOpType::Translate, values: vec![1.0] }] };
        assert!(matches!(Transform::interpolate(&a, &d, 0.5), Err(Error::SampleMismatch(_))));
    }

    #[test]
    fn test_encode_decode() {
        let m = DMat4::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let t = Transform::from_matrix(&m).with(XformOp::rotate(DVec3::Y, 30.0));
        let mut buf = Vec::new();
        t.encode(&mut buf);
        let back = Transform::decode(&buf).unwrap();
        assert_eq!(back, t);
        assert!(Transform::decode(&buf[..3]).is_err());
    }

    #[test]
    fn test_decode_corrupt_counts() {
        // Op count far beyond the data.
        assert!(matches!(
            Transform::decode(&[0xff, 0xff, 0xff, 0x0f]),
            Err(Error::UnexpectedEof(_))
        ));
        // One op whose value count is far beyond the data.
        let mut buf = vec![1, 0, 0, 0, XformOpType::Translate.code()];
        buf.extend_from_slice(&[0xff, 0xff, 0xff, 0x0f]);
        assert!(matches!(Transform::decode(&buf), Err(Error::UnexpectedEof(_))));
    }
}
