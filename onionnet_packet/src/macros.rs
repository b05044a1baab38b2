/*! Macros for test functions
*/

macro_rules! wire_encode_decode_test (
    ($test:ident, $value:expr) => (
        #[test]
        fn $test() {
            use crate::wire::{CodecError, Wire};

            fn decode_as<T: Wire>(_: &T, bytes: &[u8]) -> Result<T, CodecError> {
                T::from_wire(bytes)
            }

            let value = $value;
            let bytes = value.to_wire().expect("should encode");
            let decoded = decode_as(&value, &bytes).expect("should decode");
            assert_eq!(value, decoded);
        }
    )
);
