//! Native lowering of glue functions and boundary thunks with Cranelift.

use cranelift_codegen::{
    ir::{
        self, AbiParam, Block, InstBuilder, MemFlags, Signature, StackSlot, StackSlotData,
        StackSlotKind, Type, Value, condcodes::IntCC, types::*,
    },
    isa, settings,
    settings::Configurable,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use tracing::trace;

use crate::{
    error::InternalError,
    glue::{GlueFn, GlueKind, GlueOp, GlueSet},
    layout::TagWidth,
    target::Endianness,
};

mod thunk;

pub const DEFAULT_TRIPLE: &str = "x86_64-unknown-linux-gnu";

/// An object file under construction.
pub struct GlueModule {
    module: ObjectModule,
    fn_ctx: FunctionBuilderContext,
}

impl GlueModule {
    pub fn new(triple: &str) -> Result<Self, InternalError> {
        let mut settings_builder = settings::builder();
        settings_builder
            .set("opt_level", "speed")
            .map_err(|e| InternalError::Codegen(e.to_string()))?;
        let flags = settings::Flags::new(settings_builder);
        let isa = isa::lookup_by_name(triple)
            .map_err(|e| InternalError::Codegen(format!("target `{triple}`: {e}")))?
            .finish(flags)
            .map_err(|e| InternalError::Codegen(e.to_string()))?;

        let builder =
            ObjectBuilder::new(isa, "tagglue", cranelift_module::default_libcall_names())?;
        Ok(Self {
            module: ObjectModule::new(builder),
            fn_ctx: FunctionBuilderContext::new(),
        })
    }

    fn pointer_type(&self) -> Type {
        self.module.target_config().pointer_type()
    }

    /// Define every function of `glue` with exported linkage.
    pub fn define_glue(&mut self, glue: &GlueSet) -> Result<(), InternalError> {
        for f in glue.functions() {
            self.define_glue_fn(f)?;
        }
        Ok(())
    }

    fn define_glue_fn(&mut self, f: &GlueFn) -> Result<FuncId, InternalError> {
        let ptr = self.pointer_type();
        let mut sig = self.module.make_signature();
        match f.kind {
            GlueKind::Construct(_) => {
                sig.params.push(AbiParam::new(ptr));
                sig.params.push(AbiParam::new(ptr));
            }
            GlueKind::Read(_) => {
                sig.params.push(AbiParam::new(ptr));
                sig.params.push(AbiParam::new(ptr));
                sig.returns.push(AbiParam::new(I8));
            }
            GlueKind::Match => {
                sig.params.push(AbiParam::new(ptr));
                sig.returns.push(AbiParam::new(I64));
            }
        }

        let native = self.module.isa().endianness();
        trace!(name = %f.name, "lowering glue");
        self.define(&f.name, Linkage::Export, sig, |b, _, args| {
            lower_glue(b, f, native, args);
            Ok(())
        })
    }

    /// Declare `name`, build its body with `body` and define it.
    fn define(
        &mut self,
        name: &str,
        linkage: Linkage,
        sig: Signature,
        body: impl FnOnce(
            &mut FunctionBuilder,
            &mut ObjectModule,
            &[Value],
        ) -> Result<(), InternalError>,
    ) -> Result<FuncId, InternalError> {
        let id = self.module.declare_function(name, linkage, &sig)?;

        let mut ctx = self.module.make_context();
        ctx.func.signature = sig;

        let mut b = FunctionBuilder::new(&mut ctx.func, &mut self.fn_ctx);
        let block = b.create_block();
        b.append_block_params_for_function_params(block);
        b.switch_to_block(block);
        let args = b.block_params(block).to_vec();

        body(&mut b, &mut self.module, &args)?;

        b.seal_all_blocks();
        b.finalize();

        self.module.define_function(id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        Ok(id)
    }

    /// Emit the object file.
    pub fn finish(self) -> Result<Vec<u8>, InternalError> {
        self.module
            .finish()
            .emit()
            .map_err(|e| InternalError::Codegen(e.to_string()))
    }
}

fn lower_glue(b: &mut FunctionBuilder, f: &GlueFn, native: ir::Endianness, args: &[Value]) {
    let value = args[0];
    let mut tag = None;

    for op in &f.ops {
        match *op {
            GlueOp::WritePayload { offset, len } => {
                copy_bytes(b, args[1], 0, value, offset, len);
            }
            GlueOp::WriteTag {
                offset,
                width,
                value: v,
            } => {
                let v = b.ins().iconst(tag_type(width), v as i64);
                let v = reorder(b, v, f.endianness, native);
                b.ins().store(MemFlags::new(), v, value, offset as i32);
            }
            GlueOp::ReadTag { offset, width } => {
                let v = b
                    .ins()
                    .load(tag_type(width), MemFlags::new(), value, offset as i32);
                tag = Some((reorder(b, v, f.endianness, native), width));
            }
            GlueOp::ExpectTag { expected } => {
                // the checker guarantees a preceding ReadTag
                let Some((v, width)) = tag else { continue };
                let expected = b.ins().iconst(tag_type(width), expected as i64);
                let hit = b.ins().icmp(IntCC::Equal, v, expected);
                let matched: Block = b.create_block();
                let missed = b.create_block();
                b.ins().brif(hit, matched, &[], missed, &[]);

                b.switch_to_block(missed);
                let zero = b.ins().iconst(I8, 0);
                b.ins().return_(&[zero]);

                b.switch_to_block(matched);
            }
            GlueOp::ReadPayload { offset, len } => {
                copy_bytes(b, value, offset, args[1], 0, len);
            }
        }
    }

    match f.kind {
        GlueKind::Construct(_) => {
            b.ins().return_(&[]);
        }
        GlueKind::Read(_) => {
            let one = b.ins().iconst(I8, 1);
            b.ins().return_(&[one]);
        }
        GlueKind::Match => {
            let ret = match tag {
                Some((v, TagWidth::W8)) => v,
                Some((v, _)) => b.ins().uextend(I64, v),
                None => b.ins().iconst(I64, 0),
            };
            b.ins().return_(&[ret]);
        }
    }
}

fn tag_type(width: TagWidth) -> Type {
    match width {
        TagWidth::W1 => I8,
        TagWidth::W2 => I16,
        TagWidth::W4 => I32,
        TagWidth::W8 => I64,
    }
}

/// Byte-swap `v` when `endianness` differs from the native byte order.
///
/// Applied to both loads and stores, so memory holds `endianness` order.
fn reorder(
    b: &mut FunctionBuilder,
    v: Value,
    endianness: Endianness,
    native: ir::Endianness,
) -> Value {
    let wanted = match endianness {
        Endianness::Little => ir::Endianness::Little,
        Endianness::Big => ir::Endianness::Big,
    };
    if wanted == native || b.func.dfg.value_type(v) == I8 {
        v
    } else {
        b.ins().bswap(v)
    }
}

/// Copy exactly `len` bytes, widest accesses first.
fn copy_bytes(
    b: &mut FunctionBuilder,
    src: Value,
    src_offset: u32,
    dst: Value,
    dst_offset: u32,
    len: u32,
) {
    let mut done = 0;
    while done < len {
        let ty = match len - done {
            8.. => I64,
            4..=7 => I32,
            2..=3 => I16,
            _ => I8,
        };
        let v = b
            .ins()
            .load(ty, MemFlags::new(), src, (src_offset + done) as i32);
        b.ins()
            .store(MemFlags::new(), v, dst, (dst_offset + done) as i32);
        done += ty.bytes();
    }
}

/// Stack slot of `bytes` bytes, aligned for 64-bit accesses at least.
fn staging_slot(b: &mut FunctionBuilder, bytes: u32, align: u32) -> StackSlot {
    let align_shift = align.max(8).trailing_zeros() as u8;
    b.create_sized_stack_slot(StackSlotData::new(
        StackSlotKind::ExplicitSlot,
        bytes.max(1),
        align_shift,
    ))
}
