/// Defines a `u8`-backed enum along with a checked conversion from raw bytes.
///
/// The VM fetches opcodes as plain bytes out of a chunk, so the opcode enum
/// needs a `TryFrom<u8>` that rejects anything outside the instruction set.
/// Writing that impl by hand means repeating every variant; this macro keeps
/// the list in one place.
///
/// Macro adapted from: <https://stackoverflow.com/a/57578431/6626414>
macro_rules! byte_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident {
        // match each variant in the enum
        $($(#[$vmeta:meta])* $vname:ident $(= $val:expr)?,)*
    }) => {
        // create the enum
        $(#[$meta])*
        $vis enum $name {
            // Create each variant, verbatim
            $($(#[$vmeta])* $vname $(= $val)?,)*
        }

        // create the TryFrom implementation:
        impl std::convert::TryFrom<u8> for $name {
            type Error = ();

            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    // create a match arm for each variant:
                    $(x if x == $name::$vname as u8 => Ok($name::$vname),)*
                    _ => Err(()),
                }
            }
        }
    }
}

pub(crate) use byte_enum;
