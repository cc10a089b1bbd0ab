// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reading and writing numbers, both in fixed-width binary form and as text.

use num_traits::{FromBytes, ToBytes};

use crate::{Buffer, Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// The largest number of hex digits that fit in a `u64`.
const MAX_HEX_DIGITS: usize = 16;

impl Buffer {
    /// Appends a number of type `T` in big-endian (network) byte order.
    ///
    /// ```
    /// use segbuf::Buffer;
    ///
    /// let mut buffer = Buffer::new();
    /// buffer.write_num_be(0x0102_u16);
    ///
    /// assert_eq!(buffer.read_to_vec(), [1, 2]);
    /// ```
    pub fn write_num_be<T: ToBytes>(&mut self, value: T) {
        self.write_slice(value.to_be_bytes().as_ref());
    }

    /// Appends a number of type `T` in little-endian byte order.
    pub fn write_num_le<T: ToBytes>(&mut self, value: T) {
        self.write_slice(value.to_le_bytes().as_ref());
    }

    /// Consumes a number of type `T` in big-endian (network) byte order.
    ///
    /// The bytes may be spread over any number of segments.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes than
    /// the size of `T`. Nothing is consumed in that case.
    pub fn read_num_be<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        let bytes = self.read_num_bytes::<T>()?;
        Ok(T::from_be_bytes(&bytes))
    }

    /// Consumes a number of type `T` in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer holds fewer bytes than
    /// the size of `T`. Nothing is consumed in that case.
    pub fn read_num_le<T: FromBytes>(&mut self) -> Result<T>
    where
        T::Bytes: Sized + Default,
    {
        let bytes = self.read_num_bytes::<T>()?;
        Ok(T::from_le_bytes(&bytes))
    }

    fn read_num_bytes<T: FromBytes>(&mut self) -> Result<T::Bytes>
    where
        T::Bytes: Sized + Default,
    {
        let mut bytes = T::Bytes::default();
        let size = bytes.as_ref().len();

        self.require(size)?;
        self.copy_prefix(bytes.as_mut());
        self.advance(size);

        Ok(bytes)
    }

    /// Appends the decimal text form of `value`, with a leading `-` if negative.
    pub fn write_decimal_i64(&mut self, value: i64) {
        // Long enough for "-9223372036854775808".
        let mut text = [0_u8; 20];
        let mut start = text.len();
        let mut remaining = value.unsigned_abs();

        loop {
            start -= 1;
            #[expect(clippy::cast_possible_truncation, reason = "a remainder of 10 is a single digit")]
            let digit = (remaining % 10) as u8;
            text[start] = b'0' + digit;
            remaining /= 10;

            if remaining == 0 {
                break;
            }
        }

        if value < 0 {
            start -= 1;
            text[start] = b'-';
        }

        self.write_slice(&text[start..]);
    }

    /// Appends the lowercase hexadecimal text form of `value`, without leading zeros.
    pub fn write_hex_u64(&mut self, value: u64) {
        let mut text = [0_u8; MAX_HEX_DIGITS];
        let mut start = text.len();
        let mut remaining = value;

        loop {
            start -= 1;
            #[expect(clippy::cast_possible_truncation, reason = "masked to a single nibble")]
            let nibble = (remaining & 0xF) as usize;
            text[start] = HEX_DIGITS[nibble];
            remaining >>= 4;

            if remaining == 0 {
                break;
            }
        }

        self.write_slice(&text[start..]);
    }

    /// Consumes a signed decimal number.
    ///
    /// Reads an optional leading `-` followed by ASCII digits, stopping at the first byte that
    /// is not a digit. That byte is not consumed.
    ///
    /// ```
    /// use segbuf::Buffer;
    ///
    /// let mut buffer = Buffer::from("-1234 tail");
    ///
    /// assert_eq!(buffer.read_decimal_i64().unwrap(), -1234);
    /// assert_eq!(buffer.read_to_vec(), b" tail");
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer ends before the first
    /// digit and with [`MalformedData`][crate::ErrorKind::MalformedData] if there is no digit or
    /// the number does not fit in an `i64`. Nothing is consumed on failure.
    pub fn read_decimal_i64(&mut self) -> Result<i64> {
        let mut negative = false;
        // Accumulated as a negative number, which has room for i64::MIN.
        let mut value: i64 = 0;
        let mut consumed = 0;
        let mut digits = 0;

        for byte in self.slices().flatten().copied() {
            match byte {
                b'0'..=b'9' => {
                    let digit = i64::from(byte - b'0');

                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_sub(digit))
                        .ok_or_else(|| Error::malformed("decimal number does not fit in an i64"))?;

                    digits += 1;
                }
                b'-' if consumed == 0 => negative = true,
                _ => {
                    if digits == 0 {
                        return Err(Error::malformed(format!("expected a digit or '-' but found {byte:#04x}")));
                    }

                    break;
                }
            }

            consumed += 1;
        }

        if digits == 0 {
            return Err(Error::end_of_data("buffer ended before the first digit of a decimal number"));
        }

        let value = if negative {
            value
        } else {
            value
                .checked_neg()
                .ok_or_else(|| Error::malformed("decimal number does not fit in an i64"))?
        };

        self.advance(consumed);
        Ok(value)
    }

    /// Consumes an unsigned hexadecimal number of up to 16 digits, in either letter case.
    ///
    /// Stops at the first byte that is not a hex digit. That byte is not consumed.
    ///
    /// # Errors
    ///
    /// Fails with [`EndOfData`][crate::ErrorKind::EndOfData] if the buffer is empty and with
    /// [`MalformedData`][crate::ErrorKind::MalformedData] if the first byte is not a hex digit or
    /// there are more than 16 digits. Nothing is consumed on failure.
    pub fn read_hex_u64(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut digits = 0;

        for byte in self.slices().flatten().copied() {
            let Some(nibble) = hex_value(byte) else {
                if digits == 0 {
                    return Err(Error::malformed(format!("expected a hex digit but found {byte:#04x}")));
                }

                break;
            };

            if digits == MAX_HEX_DIGITS {
                return Err(Error::malformed("hexadecimal number does not fit in a u64"));
            }

            value = (value << 4) | u64::from(nibble);
            digits += 1;
        }

        if digits == 0 {
            return Err(Error::end_of_data("buffer is empty"));
        }

        self.advance(digits);
        Ok(value)
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
