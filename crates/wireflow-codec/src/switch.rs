/*!
 * Discriminated unions.
 *
 * A [`SwitchTable`] is a static, ordered list of cases for one union. Each
 * case pairs a predicate over the discriminator (built from fields already
 * parsed) with the parse function of its variant. Cases are tried in
 * declaration order and the first match wins; a discriminator no case
 * accepts yields [`CodecError::UnknownDiscriminator`].
 */
use std::fmt;

use crate::error::{CodecError, Result};
use crate::read_buffer::ReadBuffer;

/// One variant of a union
pub struct SwitchCase<K: 'static, T: 'static, A: 'static> {
    /// Name of the variant, used as diagnostic context
    pub name: &'static str,
    /// Whether this variant is selected by the discriminator
    pub matches: fn(&K) -> bool,
    /// Parse the variant body
    pub parse: fn(&mut ReadBuffer<'_>, A) -> Result<T>,
}

/// Ordered dispatch table of a union
pub struct SwitchTable<K: 'static, T: 'static, A: 'static> {
    type_name: &'static str,
    cases: &'static [SwitchCase<K, T, A>],
}

impl<K: fmt::Debug + 'static, T: 'static, A: 'static> SwitchTable<K, T, A> {
    /// Build a table over a static case list
    pub const fn new(type_name: &'static str, cases: &'static [SwitchCase<K, T, A>]) -> Self {
        Self { type_name, cases }
    }

    /// Name of the union
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Find the first case accepting `discriminator`
    pub fn select(&self, discriminator: &K) -> Result<&'static SwitchCase<K, T, A>> {
        let cases: &'static [SwitchCase<K, T, A>] = self.cases;
        cases
            .iter()
            .find(|case| (case.matches)(discriminator))
            .ok_or_else(|| CodecError::UnknownDiscriminator {
                type_name: self.type_name,
                value: format!("{:?}", discriminator),
            })
    }

    /// Parse the variant selected by `discriminator`
    pub fn parse(&self, discriminator: &K, reader: &mut ReadBuffer<'_>, args: A) -> Result<T> {
        let case = self.select(discriminator)?;
        reader.in_context(case.name, |r| (case.parse)(r, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Body {
        Error(u8),
        Read(u16),
        Write(u16, u16),
    }

    fn parse_error(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Body> {
        Ok(Body::Error(reader.read_u8()?))
    }

    fn parse_read(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Body> {
        Ok(Body::Read(reader.read_u16()?))
    }

    fn parse_write(reader: &mut ReadBuffer<'_>, _: ()) -> Result<Body> {
        Ok(Body::Write(reader.read_u16()?, reader.read_u16()?))
    }

    static BODIES: SwitchTable<(bool, u8), Body, ()> = SwitchTable::new(
        "Body",
        &[
            SwitchCase {
                name: "Error",
                matches: |(error, _)| *error,
                parse: parse_error,
            },
            SwitchCase {
                name: "Read",
                matches: |(_, function)| *function == 0x03,
                parse: parse_read,
            },
            SwitchCase {
                name: "Write",
                matches: |(_, function)| *function == 0x06,
                parse: parse_write,
            },
        ],
    );

    #[test]
    fn test_first_matching_case_wins() -> Result<()> {
        let data = [0x02, 0x00];
        let mut reader = ReadBuffer::new(&data);
        assert_eq!(BODIES.parse(&(true, 0x03), &mut reader, ())?, Body::Error(2));

        let mut reader = ReadBuffer::new(&data);
        assert_eq!(BODIES.parse(&(false, 0x03), &mut reader, ())?, Body::Read(0x0200));
        Ok(())
    }

    #[test]
    fn test_unknown_discriminator() {
        let data = [0u8; 4];
        let mut reader = ReadBuffer::new(&data);
        let err = BODIES.parse(&(false, 0x2B), &mut reader, ()).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownDiscriminator {
                type_name: "Body",
                value: "(false, 43)".to_string(),
            }
        );
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_variant_failures_name_the_variant() {
        let data = [0x00, 0x01, 0x00];
        let mut reader = ReadBuffer::new(&data);
        match BODIES.parse(&(false, 0x06), &mut reader, ()) {
            Err(CodecError::OutOfData { context, .. }) => assert_eq!(context, "Write"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(reader.context_depth(), 0);
    }
}
