macro_rules! test_roundtrip {
    ($t:ty, $name:ident) => {
        #[allow(unused_imports)]
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn $name(orig: $t) {
                let mut buf = std::io::Cursor::new(Vec::<u8>::new());
                match orig.write(&mut buf) {
                    Err(_) => {
                        // skip
                    }
                    Ok(()) => {
                        buf.set_position(0);
                        let restored = <$t>::read(&mut buf).unwrap();
                        assert_eq!(orig, restored);
                    }
                }
            }
        }
    };
}

pub(crate) use test_roundtrip;
