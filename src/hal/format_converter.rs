//! Conversions between native device samples and the 16-bit samples the
//! processing callback works with. Everything here runs on the realtime thread,
//! so it works in place on caller-provided slices and never allocates.

/// A native sample type a backend can stream
pub trait NativeSample: Copy + Send + 'static {
    fn to_i16(self) -> i16;
    fn from_i16(value: i16) -> Self;
}

impl NativeSample for i16 {
    fn to_i16(self) -> i16 {
        self
    }

    fn from_i16(value: i16) -> Self {
        value
    }
}

impl NativeSample for i32 {
    fn to_i16(self) -> i16 {
        (self >> 16) as i16
    }

    fn from_i16(value: i16) -> Self {
        (value as i32) << 16
    }
}

impl NativeSample for u16 {
    fn to_i16(self) -> i16 {
        (self as i32 - 32768) as i16
    }

    fn from_i16(value: i16) -> Self {
        (value as i32 + 32768) as u16
    }
}

impl NativeSample for u8 {
    fn to_i16(self) -> i16 {
        ((self as i16) - 128) << 8
    }

    fn from_i16(value: i16) -> Self {
        ((value >> 8) + 128) as u8
    }
}

impl NativeSample for f32 {
    fn to_i16(self) -> i16 {
        (self * 32768.0).clamp(-32768.0, 32767.0) as i16
    }

    fn from_i16(value: i16) -> Self {
        value as f32 / 32768.0
    }
}

impl NativeSample for f64 {
    fn to_i16(self) -> i16 {
        (self * 32768.0).clamp(-32768.0, 32767.0) as i16
    }

    fn from_i16(value: i16) -> Self {
        value as f64 / 32768.0
    }
}

/// Convert native samples into `out`; returns the number written
pub fn to_i16_slice<T: NativeSample>(input: &[T], out: &mut [i16]) -> usize {
    let count = input.len().min(out.len());
    for (dst, src) in out[..count].iter_mut().zip(input) {
        *dst = src.to_i16();
    }
    count
}

/// Convert 16-bit samples into native `out`; returns the number written
pub fn from_i16_slice<T: NativeSample>(input: &[i16], out: &mut [T]) -> usize {
    let count = input.len().min(out.len());
    for (dst, src) in out[..count].iter_mut().zip(input) {
        *dst = T::from_i16(*src);
    }
    count
}
