#[macro_export]
macro_rules! tvec {
    // count helper: transform any expression into 1
    (@one $x:expr) => (1usize);
    ($elem:expr; $n:expr) => ({
        $crate::TVec::from_elem($elem, $n)
    });
    ($($x:expr),*$(,)*) => ({
        let count = 0usize $(+ $crate::tvec!(@one $x))*;
        #[allow(unused_mut)]
        let mut vec = $crate::TVec::new();
        if count <= vec.inline_size() {
            $(vec.push($x);)*
            vec
        } else {
            $crate::TVec::from_vec(vec![$($x,)*])
        }
    });
}

macro_rules! flat_table {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq)]
        pub struct $name<'a> {
            pub _tab: flatbuffers::Table<'a>,
        }

        impl<'a> flatbuffers::Follow<'a> for $name<'a> {
            type Inner = $name<'a>;
            #[inline]
            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                $name { _tab: flatbuffers::Table::new(buf, loc) }
            }
        }

        impl<'a> $name<'a> {
            #[inline]
            pub unsafe fn init_from_table(table: flatbuffers::Table<'a>) -> Self {
                $name { _tab: table }
            }
        }
    };
}

/// Option tables made only of scalar fields.
macro_rules! options_table {
    ($name:ident { $($getter:ident: $t:ty = $default:expr => $vt:expr),* $(,)? }) => {
        flat_table!($name);

        impl<'a> $name<'a> {
            $(
                #[inline]
                pub fn $getter(&self) -> $t {
                    unsafe { self._tab.get::<$t>($vt, Some($default)) }.unwrap_or($default)
                }
            )*
        }

        impl flatbuffers::Verifiable for $name<'_> {
            #[inline]
            fn run_verifier(
                v: &mut flatbuffers::Verifier,
                pos: usize,
            ) -> Result<(), flatbuffers::InvalidFlatbuffer> {
                v.visit_table(pos)?
                    $(.visit_field::<$t>(stringify!($getter), $vt, false)?)*
                    .finish();
                Ok(())
            }
        }
    };
}
