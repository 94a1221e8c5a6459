//! Statically built RPC dispatch table.
//!
//! Calls are registered as a monomorphised [`Call`] per function, wrapped
//! behind the object-safe [`RpcCall`] trait; the [`Rpc`] registry holds a
//! flat array of references to that trait, mirroring the donor reference's
//! `std::array<reference_wrapper<const NonTemplatedCall>>`: a hand-written
//! heterogeneous list plus a uniform view over it, with no heap allocation
//! and no dynamic registration after construction.

use core::marker::PhantomData;

use minicbor::decode::Decoder;
use minicbor::encode::Encoder;

use crate::value::{DecodeError, EncodeError, SliceWriter, Value};

/// Reasons a dispatch attempt can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    /// The function id didn't map to a registered call (or `0`'s schema
    /// emission, which can't fail this way).
    UnknownFunction,
    /// The argument bytes didn't decode into the call's declared argument
    /// types.
    BadArgs,
    /// The return value didn't fit in the reply buffer.
    EncodeFailed,
}

/// Maps a Rust type to the language-neutral schema tag used by host
/// tooling. Mirrors the donor reference's `Type<T>::python`: any integral
/// type (including `bool`, which is integral in the source language) maps
/// to `int`; everything not given a specific impl here falls back to `Any`,
/// matching the reference's unspecialised default. The default associated
/// const means a bare `impl TypeTag for Foo {}` already falls back to
/// `Any` without restating it.
pub trait TypeTag {
    const TAG: &'static str = "Any";
}

macro_rules! impl_type_tag_int {
    ($($t:ty),+) => {$(impl TypeTag for $t { const TAG: &'static str = "int"; })+};
}
impl_type_tag_int!(u8, u16, u32, u64, i8, i16, i32, i64, bool);

impl TypeTag for f32 {}
impl TypeTag for f64 {}
impl TypeTag for () {}
impl<'b> TypeTag for &'b str {
    const TAG: &'static str = "str";
}
impl<'b> TypeTag for crate::value::Bytes<'b> {
    const TAG: &'static str = "bytes";
}

/// Tuples get the closed set's `tuple[...]` tag. Per-element formatting
/// (e.g. `tuple[int,str]`) would need const string concatenation over a
/// generic arity, which stable Rust has no equivalent for; every tuple
/// arity instead gets the same fixed, still-distinct-from-`Any` tag.
macro_rules! impl_type_tag_tuple {
    ($($name:ident),+) => {
        impl<$($name: TypeTag),+> TypeTag for ($($name,)+) {
            const TAG: &'static str = "tuple[...]";
        }
    };
}
impl_type_tag_tuple!(A);
impl_type_tag_tuple!(A, B);
impl_type_tag_tuple!(A, B, C);
impl_type_tag_tuple!(A, B, C, D);
impl_type_tag_tuple!(A, B, C, D, E);
impl_type_tag_tuple!(A, B, C, D, E, F);
impl_type_tag_tuple!(A, B, C, D, E, F, G);
impl_type_tag_tuple!(A, B, C, D, E, F, G, H);

/// Per-argument schema tags for a call's argument tuple.
pub trait ArgTags {
    const TAGS: &'static [&'static str];
}

macro_rules! impl_arg_tags {
    ($($name:ident),+) => {
        impl<$($name: TypeTag),+> ArgTags for ($($name,)+) {
            const TAGS: &'static [&'static str] = &[$($name::TAG),+];
        }
    };
}
impl_arg_tags!(A);
impl_arg_tags!(A, B);
impl_arg_tags!(A, B, C);
impl_arg_tags!(A, B, C, D);
impl_arg_tags!(A, B, C, D, E);
impl_arg_tags!(A, B, C, D, E, F);
impl_arg_tags!(A, B, C, D, E, F, G);
impl_arg_tags!(A, B, C, D, E, F, G, H);

/// Object-safe view of a registered call: schema accessors plus the
/// type-erased invocation entry point.
pub trait RpcCall {
    fn name(&self) -> &'static str;
    fn doc(&self) -> &'static str;
    fn return_tag(&self) -> &'static str;
    fn arg_names(&self) -> &'static [&'static str];
    fn arg_tags(&self) -> &'static [&'static str];
    /// Decodes `args` per the call's static argument types, invokes the
    /// handler, and encodes the result into `ret`. Returns the number of
    /// bytes written.
    fn call(&self, args: &[u8], ret: &mut [u8]) -> Result<usize, DispatchError>;
}

/// A single typed RPC handler: `name(arg_0: T0, arg_1: T1, ...) -> Ret`.
pub struct Call<Ret, Args, F> {
    name: &'static str,
    doc: &'static str,
    arg_names: &'static [&'static str],
    func: F,
    _marker: PhantomData<fn(Args) -> Ret>,
}

impl<Ret, Args, F> Call<Ret, Args, F>
where
    F: Fn(Args) -> Ret,
{
    pub const fn new(
        name: &'static str,
        doc: &'static str,
        arg_names: &'static [&'static str],
        func: F,
    ) -> Self {
        Call { name, doc, arg_names, func, _marker: PhantomData }
    }
}

impl<Ret, Args, F> RpcCall for Call<Ret, Args, F>
where
    F: Fn(Args) -> Ret,
    Ret: for<'b> Value<'b> + TypeTag,
    Args: for<'b> Value<'b> + ArgTags,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn doc(&self) -> &'static str {
        self.doc
    }

    fn return_tag(&self) -> &'static str {
        Ret::TAG
    }

    fn arg_names(&self) -> &'static [&'static str] {
        self.arg_names
    }

    fn arg_tags(&self) -> &'static [&'static str] {
        Args::TAGS
    }

    fn call(&self, args: &[u8], ret: &mut [u8]) -> Result<usize, DispatchError> {
        let mut d = Decoder::new(args);
        let argv = Args::decode(&mut d).map_err(|_: DecodeError| DispatchError::BadArgs)?;
        let result = (self.func)(argv);
        let mut e = Encoder::new(SliceWriter::new(ret));
        result.encode(&mut e).map_err(|_: EncodeError| DispatchError::EncodeFailed)?;
        Ok(e.into_writer().len())
    }
}

/// The statically built dispatch table. Function id `0` is reserved and
/// always emits the schema; id `1` maps to `calls[0]`, id `2` to
/// `calls[1]`, and so on.
pub struct Rpc<'a> {
    calls: &'a [&'a dyn RpcCall],
}

impl<'a> Rpc<'a> {
    pub const fn new(calls: &'a [&'a dyn RpcCall]) -> Self {
        Rpc { calls }
    }

    /// Encodes the schema array for every registered call into `out`.
    pub fn schema(&self, out: &mut [u8]) -> Result<usize, EncodeError> {
        let mut e = Encoder::new(SliceWriter::new(out));
        e.array(self.calls.len() as u64).map_err(EncodeError::from)?;
        for call in self.calls {
            let arity = call.arg_names().len();
            e.array((3 + 2 * arity) as u64).map_err(EncodeError::from)?;
            call.name().encode(&mut e)?;
            call.doc().encode(&mut e)?;
            call.return_tag().encode(&mut e)?;
            let names = call.arg_names();
            let tags = call.arg_tags();
            for i in 0..arity {
                names[i].encode(&mut e)?;
                tags[i].encode(&mut e)?;
            }
        }
        Ok(e.into_writer().len())
    }

    /// Dispatches function id `n`. `n == 0` emits the schema instead of
    /// invoking a handler.
    pub fn call(&self, n: u8, args: &[u8], ret: &mut [u8]) -> Result<usize, DispatchError> {
        if n == 0 {
            return self.schema(ret).map_err(|_| DispatchError::EncodeFailed);
        }
        let idx = n as usize - 1;
        let call = self.calls.get(idx).ok_or(DispatchError::UnknownFunction)?;
        call.call(args, ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(args: (u32, u32)) -> u32 {
        args.0 + args.1
    }

    #[test]
    fn schema_round_trip_for_single_call() {
        let add_call: Call<u32, (u32, u32), _> =
            Call::new("add", "return x+y", &["x", "y"], add);
        let calls: [&dyn RpcCall; 1] = [&add_call];
        let rpc = Rpc::new(&calls);

        let mut buf = [0u8; 128];
        let n = rpc.call(0, &[], &mut buf).unwrap();

        let mut d = Decoder::new(&buf[..n]);
        let entry: (&str, &str, &str, &str, &str, &str, &str) = Value::decode(&mut d).unwrap();
        assert_eq!(entry, ("add", "return x+y", "int", "x", "int", "y", "int"));
    }

    #[test]
    fn call_round_trip_invokes_handler() {
        let add_call: Call<u32, (u32, u32), _> =
            Call::new("add", "return x+y", &["x", "y"], add);
        let calls: [&dyn RpcCall; 1] = [&add_call];
        let rpc = Rpc::new(&calls);

        let mut args_buf = [0u8; 16];
        let mut e = Encoder::new(SliceWriter::new(&mut args_buf));
        (2u32, 3u32).encode(&mut e).unwrap();
        let args_len = e.into_writer().len();

        let mut ret_buf = [0u8; 16];
        let n = rpc.call(1, &args_buf[..args_len], &mut ret_buf).unwrap();
        let mut d = Decoder::new(&ret_buf[..n]);
        let result: u32 = Value::decode(&mut d).unwrap();
        assert_eq!(result, 5);
    }

    #[test]
    fn unknown_function_id_fails() {
        let add_call: Call<u32, (u32, u32), _> =
            Call::new("add", "return x+y", &["x", "y"], add);
        let calls: [&dyn RpcCall; 1] = [&add_call];
        let rpc = Rpc::new(&calls);
        let mut ret_buf = [0u8; 16];
        assert_eq!(rpc.call(5, &[], &mut ret_buf), Err(DispatchError::UnknownFunction));
    }
}
