//! End-to-end decode tests over synthesized NIfTI-1 buffers.
//!
//! Buffers are built field by field in either byte order so that every case is
//! independent of files on disk and of the host's endianness.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use niftiview::nifti::{
    self, ChannelReporter, DataType, DecodeOptions, Decoder, Endianness, ErrorEvent, VoxelData,
};
use niftiview::transforms::{AxisName, RotationAngles, StepOverrides};
use niftiview::Error;
use std::sync::mpsc;

/// Field-level description of a test file.
struct NiftiBuilder {
    ndim: u16,
    dim: [u16; 3],
    time_length: u16,
    datatype: u16,
    bitpix: u16,
    slope: f32,
    inter: f32,
    vox_offset: f32,
}

impl NiftiBuilder {
    fn new(dim: [u16; 3], datatype: u16, bitpix: u16) -> Self {
        Self {
            ndim: 3,
            dim,
            time_length: 0,
            datatype,
            bitpix,
            slope: 0.0,
            inter: 0.0,
            vox_offset: 352.0,
        }
    }

    fn time(mut self, length: u16) -> Self {
        self.ndim = 4;
        self.time_length = length;
        self
    }

    fn scale(mut self, slope: f32, inter: f32) -> Self {
        self.slope = slope;
        self.inter = inter;
        self
    }

    fn header<E: ByteOrder>(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; 352];
        E::write_u32(&mut bytes[0..4], 348);
        E::write_u16(&mut bytes[40..42], self.ndim);
        E::write_u16(&mut bytes[42..44], self.dim[0]);
        E::write_u16(&mut bytes[44..46], self.dim[1]);
        E::write_u16(&mut bytes[46..48], self.dim[2]);
        E::write_u16(&mut bytes[48..50], self.time_length);
        E::write_u16(&mut bytes[70..72], self.datatype);
        E::write_u16(&mut bytes[72..74], self.bitpix);
        E::write_f32(&mut bytes[92..96], 2.0);
        E::write_f32(&mut bytes[108..112], self.vox_offset);
        E::write_f32(&mut bytes[112..116], self.slope);
        E::write_f32(&mut bytes[116..120], self.inter);
        bytes[344..348].copy_from_slice(b"n+1\0");
        bytes
    }

    fn with_i16<E: ByteOrder>(&self, values: &[i16]) -> Vec<u8> {
        let mut bytes = self.header::<E>();
        let start = bytes.len();
        bytes.resize(start + values.len() * 2, 0);
        E::write_i16_into(values, &mut bytes[start..]);
        bytes
    }

    fn with_f64<E: ByteOrder>(&self, values: &[f64]) -> Vec<u8> {
        let mut bytes = self.header::<E>();
        let start = bytes.len();
        bytes.resize(start + values.len() * 8, 0);
        E::write_f64_into(values, &mut bytes[start..]);
        bytes
    }

    fn with_bytes<E: ByteOrder>(&self, payload: &[u8]) -> Vec<u8> {
        let mut bytes = self.header::<E>();
        bytes.extend_from_slice(payload);
        bytes
    }
}

fn channel_decoder() -> (Decoder, mpsc::Receiver<ErrorEvent>) {
    let (tx, rx) = mpsc::channel();
    let decoder = Decoder::default().with_reporter(ChannelReporter::new(tx));
    (decoder, rx)
}

#[test]
fn test_int16_volume_strides_and_type() {
    // x = 64, y = 64, z = 30; dim[1] is the fastest axis and lands on z.
    let builder = NiftiBuilder::new([30, 64, 64], 4, 16);
    let count = 64 * 64 * 30;
    let values: Vec<i16> = (0..count).map(|i| (i % 30000) as i16).collect();
    let mut bytes = builder.with_i16::<LittleEndian>(&values);

    let volume = nifti::decode(&mut bytes).unwrap();
    let header = volume.header();

    assert_eq!(volume.data().len(), count);
    assert_eq!(volume.data().dtype(), DataType::Int16);
    assert_eq!(header.data_type(), DataType::Int16);
    assert_eq!(
        header.axis_order(),
        [AxisName::XSpace, AxisName::YSpace, AxisName::ZSpace]
    );
    assert_eq!(volume.shape(), [64, 64, 30]);

    let strides = header.strides();
    assert_eq!(strides.get(AxisName::XSpace), Some(1920));
    assert_eq!(strides.get(AxisName::YSpace), Some(30));
    assert_eq!(strides.get(AxisName::ZSpace), Some(1));
    assert_eq!(strides.time, None);

    let flat = 5 * 1920 + 7 * 30 + 11;
    assert_eq!(
        volume.value_at([5, 7, 11], 0),
        Some((flat % 30000) as f64)
    );
    assert_eq!(volume.value_at([64, 0, 0], 0), None);
    assert_eq!(volume.intensity_min(), 0.0);
    assert_eq!(volume.intensity_max(), 29999.0);
}

#[test]
fn test_unsupported_datatype_is_reported() {
    let builder = NiftiBuilder::new([2, 2, 2], 2048, 8);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 8]);
    let (decoder, rx) = channel_decoder();

    let err = decoder.decode(&mut bytes).unwrap_err();
    assert_eq!(err, Error::UnsupportedDatatype(2048));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.name, nifti::ERROR_EVENT);
    assert!(event.message.contains("unsupported data type"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unsupported_datatype_found_after_header() {
    // The header itself parses; the code is only rejected at payload decode.
    let builder = NiftiBuilder::new([2, 2, 2], 1536, 128);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 128]);

    let header = nifti::parse_header(&bytes).unwrap();
    assert_eq!(header.raw().datatype_code, 1536);
    assert_eq!(
        nifti::decode_voxels(header, &mut bytes),
        Err(Error::UnsupportedDatatype(1536))
    );
}

#[test]
fn test_rescale_to_float() {
    let builder = NiftiBuilder::new([2, 1, 1], 2, 8).scale(2.0, 10.0);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[5, 0]);

    let volume = nifti::decode(&mut bytes).unwrap();
    assert_eq!(volume.header().data_type(), DataType::Float32);
    assert_eq!(volume.data(), &VoxelData::Float32(vec![20.0, 10.0]));
    assert_eq!(volume.intensity_min(), 10.0);
    assert_eq!(volume.intensity_max(), 20.0);
}

#[test]
fn test_zero_slope_keeps_raw_bits() {
    let values = [-0.0, f64::MIN_POSITIVE, 1.5e300, -7.25, 0.1, 3.0];
    let builder = NiftiBuilder::new([3, 2, 1], 64, 64).scale(0.0, 100.0);
    let mut bytes = builder.with_f64::<LittleEndian>(&values);

    let volume = nifti::decode(&mut bytes).unwrap();
    let decoded = volume.data().as_slice::<f64>().unwrap();
    let decoded_bits: Vec<u64> = decoded.iter().map(|v| v.to_bits()).collect();
    let expected_bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    assert_eq!(decoded_bits, expected_bits);
    assert_eq!(volume.header().data_type(), DataType::Float64);
}

#[test]
fn test_big_endian_decodes_like_little_endian() {
    let builder = NiftiBuilder::new([4, 3, 2], 4, 16);
    let values: Vec<i16> = (0..24).map(|i| i * 1000 - 12000).collect();

    let mut le = builder.with_i16::<LittleEndian>(&values);
    let mut be = builder.with_i16::<BigEndian>(&values);

    let le_header = nifti::parse_header(&le).unwrap();
    let be_header = nifti::parse_header(&be).unwrap();
    assert_eq!(be_header.raw().byte_order, Endianness::Big);
    assert_eq!(
        be_header.raw().must_swap_bytes,
        cfg!(target_endian = "little")
    );
    assert_eq!(le_header.spatial_axes(), be_header.spatial_axes());
    assert_eq!(le_header.spatial_order(), be_header.spatial_order());

    let le_volume = nifti::decode(&mut le).unwrap();
    let be_volume = nifti::decode(&mut be).unwrap();
    assert_eq!(le_volume.data(), be_volume.data());
    assert_eq!(le_volume.data().as_slice::<i16>().unwrap(), values.as_slice());
}

#[test]
fn test_corrupted_magic_byte() {
    let builder = NiftiBuilder::new([2, 2, 2], 2, 8);
    for index in 344..348 {
        let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 8]);
        bytes[index] ^= 0x20;
        let (decoder, rx) = channel_decoder();

        assert!(matches!(decoder.decode(&mut bytes), Err(Error::BadMagic(_))));
        assert!(rx.try_recv().unwrap().message.contains("invalid NIfTI magic"));
    }
}

#[test]
fn test_bad_size_marker() {
    let builder = NiftiBuilder::new([2, 2, 2], 2, 8);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 8]);
    LittleEndian::write_u32(&mut bytes[0..4], 540);
    assert!(matches!(nifti::decode(&mut bytes), Err(Error::BadMagic(_))));
}

#[test]
fn test_unsupported_dimensionality() {
    for ndim in [2u16, 5] {
        let mut builder = NiftiBuilder::new([2, 2, 2], 2, 8);
        builder.ndim = ndim;
        let bytes = builder.with_bytes::<BigEndian>(&[0u8; 8]);
        let (decoder, rx) = channel_decoder();

        assert_eq!(
            decoder.parse_header(&bytes),
            Err(Error::UnsupportedDimensionality(ndim))
        );
        assert!(rx.try_recv().is_ok());
    }
}

#[test]
fn test_time_series_addressing() {
    let builder = NiftiBuilder::new([2, 3, 4], 2, 8).time(3);
    let payload: Vec<u8> = (0..72).collect();
    let mut bytes = builder.with_bytes::<LittleEndian>(&payload);

    let volume = nifti::decode(&mut bytes).unwrap();
    let header = volume.header();
    assert_eq!(header.oriented().axis_order()[0], AxisName::Time);
    assert_eq!(header.axis_order().len(), 3);
    assert_eq!(volume.time_points(), 3);
    assert_eq!(header.strides().time, Some(24));
    assert_eq!(header.axis(AxisName::Time).unwrap().step, 2.0);

    // x = dim[3] = 4, y = 3, z = dim[1] = 2
    assert_eq!(volume.shape(), [4, 3, 2]);
    assert_eq!(volume.value_at([3, 2, 1], 2), Some(71.0));
    assert_eq!(volume.value_at([1, 0, 1], 1), Some((24 + 6 + 1) as f64));
    assert_eq!(volume.value_at([0, 0, 0], 3), None);

    let array = volume.to_array().unwrap();
    assert_eq!(array.shape(), &[3, 4, 3, 2]);
    assert_eq!(array[[2, 3, 2, 1]], 71.0);
    assert_eq!(array[[1, 1, 0, 1]], 31.0);
}

#[test]
fn test_truncated_payload() {
    let builder = NiftiBuilder::new([4, 4, 4], 4, 16);
    let mut bytes = builder.with_i16::<LittleEndian>(&[1; 63]);
    assert!(matches!(
        nifti::decode(&mut bytes),
        Err(Error::MalformedPayload(_))
    ));
}

#[test]
fn test_trailing_bytes_ignored() {
    let builder = NiftiBuilder::new([2, 1, 1], 2, 8);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[9, 8, 7, 6]);
    let volume = nifti::decode(&mut bytes).unwrap();
    assert_eq!(volume.data(), &VoxelData::UInt8(vec![9, 8]));
}

#[test]
fn test_bitpix_mismatch() {
    let builder = NiftiBuilder::new([2, 1, 1], 16, 16);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 8]);
    assert!(matches!(
        nifti::decode(&mut bytes),
        Err(Error::MalformedPayload(_))
    ));
}

#[test]
fn test_default_orientation_world_mapping() {
    let builder = NiftiBuilder::new([4, 4, 4], 2, 8);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 64]);
    let volume = nifti::decode(&mut bytes).unwrap();

    let world = volume.voxel_to_world([1.0, 2.0, 3.0]);
    let expected = [1.0, -2.0, 3.0];
    for (w, e) in world.iter().zip(expected.iter()) {
        assert!((w - e).abs() < 1e-9, "{:?}", world);
    }

    let voxel = volume.world_to_voxel(world).unwrap();
    for (v, e) in voxel.iter().zip([1.0, 2.0, 3.0].iter()) {
        assert!((v - e).abs() < 1e-9, "{:?}", voxel);
    }
}

#[test]
fn test_reorient_is_idempotent_and_updates_strides() {
    let builder = NiftiBuilder::new([2, 3, 4], 2, 8);
    let payload: Vec<u8> = (0..24).collect();
    let mut bytes = builder.with_bytes::<LittleEndian>(&payload);
    let mut volume = nifti::decode(&mut bytes).unwrap();

    let identity = RotationAngles::new(0.0, 0.0, 0.0);
    volume.reorient(identity).unwrap();
    let once = volume.clone();
    volume.reorient(identity).unwrap();
    assert_eq!(volume, once);

    // dim[1] now maps to x-space, which becomes the contiguous axis.
    let header = volume.header();
    assert_eq!(
        header.axis_order(),
        [AxisName::ZSpace, AxisName::YSpace, AxisName::XSpace]
    );
    assert_eq!(volume.shape(), [2, 3, 4]);
    assert_eq!(header.strides().spatial, [1, 2, 6]);
    assert_eq!(volume.value_at([1, 2, 3], 0), Some(23.0));
}

#[test]
fn test_step_overrides_target_x_only() {
    let builder = NiftiBuilder::new([2, 2, 2], 2, 8);
    let mut bytes = builder.with_bytes::<LittleEndian>(&[0u8; 8]);
    let decoder = Decoder::new(DecodeOptions::new().step_override(AxisName::YSpace, 2.5));
    let mut volume = decoder.decode(&mut bytes).unwrap();

    let header = volume.header();
    assert_eq!(header.axis(AxisName::XSpace).unwrap().step, 2.5);
    assert!((header.axis(AxisName::YSpace).unwrap().step + 1.0).abs() < 1e-9);

    volume
        .set_step_overrides(StepOverrides::default())
        .unwrap();
    assert!((volume.header().axis(AxisName::XSpace).unwrap().step - 1.0).abs() < 1e-9);
}

#[test]
fn test_parallel_decodes() {
    let decoder = Decoder::default();
    let builder = NiftiBuilder::new([8, 8, 8], 4, 16);
    let values: Vec<i16> = (0..512).collect();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let mut bytes = builder.with_i16::<BigEndian>(&values);
            let decoder = &decoder;
            let values = &values;
            scope.spawn(move || {
                let volume = decoder.decode(&mut bytes).unwrap();
                assert_eq!(volume.data().as_slice::<i16>().unwrap(), values.as_slice());
            });
        }
    });
}

/// Payload of four voxels for `datatype` in byte order `E`, plus the values it holds.
fn encoded_payload<E: ByteOrder>(datatype: DataType) -> (Vec<u8>, Vec<f64>) {
    let mut bytes = vec![0u8; 4 * datatype.byte_size()];
    let expected: Vec<f64> = match datatype {
        DataType::UInt8 => {
            let values = [0u8, 17, 255, 128];
            bytes.copy_from_slice(&values);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::Int8 => {
            let values = [-128i8, -1, 0, 127];
            bytes = values.iter().map(|&v| v as u8).collect();
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::Int16 => {
            let values = [i16::MIN, -2, 300, i16::MAX];
            E::write_i16_into(&values, &mut bytes);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::UInt16 => {
            let values = [0u16, 1, 40000, u16::MAX];
            E::write_u16_into(&values, &mut bytes);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::Int32 => {
            let values = [i32::MIN, -5, 70000, i32::MAX];
            E::write_i32_into(&values, &mut bytes);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::UInt32 => {
            let values = [0u32, 3, 3_000_000_000, u32::MAX];
            E::write_u32_into(&values, &mut bytes);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::Float32 => {
            let values = [-1.5f32, 0.25, 1e20, -3e-5];
            E::write_f32_into(&values, &mut bytes);
            values.iter().map(|&v| f64::from(v)).collect()
        }
        DataType::Float64 => {
            let values = [-1e300, 2.5, 0.0, 7.125];
            E::write_f64_into(&values, &mut bytes);
            values.to_vec()
        }
    };
    (bytes, expected)
}

fn check_every_datatype<E: ByteOrder>(byte_order: Endianness) {
    let datatypes = [
        DataType::UInt8,
        DataType::Int16,
        DataType::Int32,
        DataType::Float32,
        DataType::Float64,
        DataType::Int8,
        DataType::UInt16,
        DataType::UInt32,
    ];

    for datatype in datatypes {
        let (payload, expected) = encoded_payload::<E>(datatype);
        let bitpix = (datatype.byte_size() * 8) as u16;
        let builder = NiftiBuilder::new([2, 2, 1], datatype.code(), bitpix);
        let mut bytes = builder.with_bytes::<E>(&payload);

        let header = nifti::parse_header(&bytes).unwrap();
        assert_eq!(header.raw().byte_order, byte_order);
        assert_eq!(
            header.raw().must_swap_bytes,
            byte_order != Endianness::native() && datatype.byte_size() > 1,
            "{}",
            datatype
        );

        let volume = nifti::decode_voxels(header, &mut bytes).unwrap();
        assert_eq!(volume.data().dtype(), datatype);
        assert_eq!(volume.header().data_type(), datatype);
        assert_eq!(
            volume.data().to_f64_vec(),
            expected,
            "{} {:?}",
            datatype,
            byte_order
        );

        let min = expected.iter().copied().fold(f64::INFINITY, f64::min);
        let max = expected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(volume.intensity_min(), min, "{}", datatype);
        assert_eq!(volume.intensity_max(), max, "{}", datatype);
    }
}

#[test]
fn test_every_datatype_little_endian() {
    check_every_datatype::<LittleEndian>(Endianness::Little);
}

#[test]
fn test_every_datatype_big_endian() {
    check_every_datatype::<BigEndian>(Endianness::Big);
}

#[test]
fn test_typed_slices_match_datatype() {
    let (payload, _) = encoded_payload::<BigEndian>(DataType::UInt32);
    let builder = NiftiBuilder::new([2, 2, 1], 768, 32);
    let mut bytes = builder.with_bytes::<BigEndian>(&payload);
    let volume = nifti::decode(&mut bytes).unwrap();
    assert_eq!(
        volume.data().as_slice::<u32>().unwrap(),
        &[0, 3, 3_000_000_000, u32::MAX]
    );
    assert!(volume.data().as_slice::<i32>().is_none());

    let (payload, _) = encoded_payload::<BigEndian>(DataType::Float32);
    let builder = NiftiBuilder::new([2, 2, 1], 16, 32);
    let mut bytes = builder.with_bytes::<BigEndian>(&payload);
    let volume = nifti::decode(&mut bytes).unwrap();
    assert_eq!(
        volume.data().as_slice::<f32>().unwrap(),
        &[-1.5f32, 0.25, 1e20, -3e-5]
    );
}
