//! Boundary thunks translating between the host convention and the
//! compiled program's internal one.
//!
//! Internally sum values are always passed by pointer and sum results are
//! written through a leading out-pointer. On the host side a value travels
//! as its [`PassMode`] dictates.

use cranelift_codegen::ir::{
    self, AbiParam, FuncRef, InstBuilder, Signature, StackSlot, Type, Value, types::*,
};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module};
use tracing::trace;

use crate::{
    boundary::{BoundaryPlan, CHUNK_BYTES, Crossing, Direction, PassMode, SumCrossing},
    cl_backend::{GlueModule, copy_bytes, reorder, staging_slot},
    error::InternalError,
    target::Endianness,
    types::Primitive,
};

/// Symbol of the compiled implementation behind an exported entry point.
pub fn impl_symbol(entry: &str) -> String {
    format!("__tagglue_impl_{entry}")
}

/// Symbol the compiled program calls to reach an imported entry point.
pub fn import_symbol(entry: &str) -> String {
    format!("__tagglue_import_{entry}")
}

impl GlueModule {
    /// Define the thunk of one planned entry point.
    ///
    /// Host chunks carry the value bytes in `endianness` order.
    pub fn define_thunk(
        &mut self,
        plan: &BoundaryPlan,
        endianness: Endianness,
    ) -> Result<(), InternalError> {
        let host = self.host_signature(plan)?;
        let internal = self.internal_signature(plan)?;
        let thunk = Thunk {
            plan,
            ptr: self.pointer_type(),
            endianness,
            native: self.module.isa().endianness(),
        };

        match plan.direction {
            Direction::Export => {
                let callee =
                    self.module
                        .declare_function(&impl_symbol(&plan.name), Linkage::Import, &internal)?;
                trace!(entry = %plan.name, "lowering export thunk");
                self.define(&plan.name, Linkage::Export, host, |b, m, args| {
                    let callee = m.declare_func_in_func(callee, b.func);
                    thunk.export(b, callee, args);
                    Ok(())
                })?;
            }
            Direction::Import => {
                let callee = self
                    .module
                    .declare_function(&plan.name, Linkage::Import, &host)?;
                trace!(entry = %plan.name, "lowering import thunk");
                self.define(
                    &import_symbol(&plan.name),
                    Linkage::Export,
                    internal,
                    |b, m, args| {
                        let callee = m.declare_func_in_func(callee, b.func);
                        thunk.import(b, callee, args);
                        Ok(())
                    },
                )?;
            }
        }
        Ok(())
    }

    fn scalar_type(&self, p: Primitive) -> Result<Type, InternalError> {
        Ok(match p {
            Primitive::U8 | Primitive::I8 | Primitive::Bool => I8,
            Primitive::U16 | Primitive::I16 => I16,
            Primitive::U32 | Primitive::I32 => I32,
            Primitive::U64 | Primitive::I64 => I64,
            Primitive::Usize | Primitive::Isize => self.pointer_type(),
            Primitive::F32 => F32,
            Primitive::F64 => F64,
            Primitive::Str => {
                return Err(InternalError::Codegen(
                    "`str` has no boundary representation".to_string(),
                ));
            }
        })
    }

    fn host_signature(&self, plan: &BoundaryPlan) -> Result<Signature, InternalError> {
        let ptr = self.pointer_type();
        let mut sig = self.module.make_signature();
        if plan.returns_indirect() {
            sig.params.push(AbiParam::new(ptr));
        }
        for param in &plan.params {
            match param {
                Crossing::Scalar(p) => sig.params.push(AbiParam::new(self.scalar_type(*p)?)),
                Crossing::Sum(s) => match s.mode {
                    PassMode::Direct { chunks } => {
                        sig.params.extend((0..chunks).map(|_| AbiParam::new(I64)))
                    }
                    PassMode::Indirect => sig.params.push(AbiParam::new(ptr)),
                },
            }
        }
        match &plan.ret {
            Some(Crossing::Scalar(p)) => sig.returns.push(AbiParam::new(self.scalar_type(*p)?)),
            Some(Crossing::Sum(SumCrossing {
                mode: PassMode::Direct { chunks },
                ..
            })) => sig.returns.extend((0..*chunks).map(|_| AbiParam::new(I64))),
            Some(Crossing::Sum(_)) | None => {}
        }
        Ok(sig)
    }

    fn internal_signature(&self, plan: &BoundaryPlan) -> Result<Signature, InternalError> {
        let ptr = self.pointer_type();
        let mut sig = self.module.make_signature();
        if let Some(Crossing::Sum(_)) = plan.ret {
            sig.params.push(AbiParam::new(ptr));
        }
        for param in &plan.params {
            let ty = match param {
                Crossing::Scalar(p) => self.scalar_type(*p)?,
                Crossing::Sum(_) => ptr,
            };
            sig.params.push(AbiParam::new(ty));
        }
        if let Some(Crossing::Scalar(p)) = plan.ret {
            sig.returns.push(AbiParam::new(self.scalar_type(p)?));
        }
        Ok(sig)
    }
}

struct Thunk<'p> {
    plan: &'p BoundaryPlan,
    ptr: Type,
    endianness: Endianness,
    native: ir::Endianness,
}

impl Thunk<'_> {
    /// Host arguments in, internal call out.
    fn export(&self, b: &mut FunctionBuilder, callee: FuncRef, args: &[Value]) {
        let mut host = args.iter().copied();
        let mut call_args = vec![];
        let mut ret_slot = None;

        if let Some(Crossing::Sum(s)) = &self.plan.ret {
            match s.mode {
                PassMode::Indirect => call_args.extend(host.next()),
                PassMode::Direct { chunks } => {
                    let ss = self.zeroed_slot(b, chunks, s.layout.align);
                    call_args.push(b.ins().stack_addr(self.ptr, ss, 0));
                    ret_slot = Some((ss, chunks));
                }
            }
        }

        for param in &self.plan.params {
            match param {
                Crossing::Sum(SumCrossing {
                    mode: PassMode::Direct { chunks },
                    layout,
                    ..
                }) => {
                    let ss = staging_slot(b, chunks * CHUNK_BYTES, layout.align);
                    for i in 0..*chunks {
                        if let Some(v) = host.next() {
                            let v = reorder(b, v, self.endianness, self.native);
                            b.ins().stack_store(v, ss, (i * CHUNK_BYTES) as i32);
                        }
                    }
                    call_args.push(b.ins().stack_addr(self.ptr, ss, 0));
                }
                Crossing::Scalar(_) | Crossing::Sum(_) => call_args.extend(host.next()),
            }
        }

        let call = b.ins().call(callee, &call_args);
        let results = b.inst_results(call).to_vec();

        match ret_slot {
            Some((ss, chunks)) => {
                let values: Vec<Value> = (0..chunks)
                    .map(|i| {
                        let v = b.ins().stack_load(I64, ss, (i * CHUNK_BYTES) as i32);
                        reorder(b, v, self.endianness, self.native)
                    })
                    .collect();
                b.ins().return_(&values);
            }
            None => {
                b.ins().return_(&results);
            }
        }
    }

    /// Internal arguments in, host call out.
    fn import(&self, b: &mut FunctionBuilder, callee: FuncRef, args: &[Value]) {
        let mut internal = args.iter().copied();
        let mut call_args = vec![];

        let out = match &self.plan.ret {
            Some(Crossing::Sum(_)) => internal.next(),
            _ => None,
        };
        if self.plan.returns_indirect() {
            call_args.extend(out);
        }

        for param in &self.plan.params {
            match param {
                Crossing::Sum(SumCrossing {
                    mode: PassMode::Direct { chunks },
                    layout,
                    ..
                }) => {
                    let Some(src) = internal.next() else { continue };
                    let ss = self.zeroed_slot(b, *chunks, layout.align);
                    let staged = b.ins().stack_addr(self.ptr, ss, 0);
                    copy_bytes(b, src, 0, staged, 0, layout.size);
                    for i in 0..*chunks {
                        let v = b.ins().stack_load(I64, ss, (i * CHUNK_BYTES) as i32);
                        call_args.push(reorder(b, v, self.endianness, self.native));
                    }
                }
                Crossing::Scalar(_) | Crossing::Sum(_) => call_args.extend(internal.next()),
            }
        }

        let call = b.ins().call(callee, &call_args);
        let results = b.inst_results(call).to_vec();

        match &self.plan.ret {
            Some(Crossing::Sum(SumCrossing {
                mode: PassMode::Direct { chunks },
                layout,
                ..
            })) => {
                let ss = staging_slot(b, chunks * CHUNK_BYTES, layout.align);
                for (i, v) in results.iter().enumerate() {
                    let v = reorder(b, *v, self.endianness, self.native);
                    b.ins().stack_store(v, ss, i as i32 * CHUNK_BYTES as i32);
                }
                if let Some(out) = out {
                    let staged = b.ins().stack_addr(self.ptr, ss, 0);
                    copy_bytes(b, staged, 0, out, 0, layout.size);
                }
                b.ins().return_(&[]);
            }
            Some(Crossing::Sum(_)) => {
                b.ins().return_(&[]);
            }
            Some(Crossing::Scalar(_)) | None => {
                b.ins().return_(&results);
            }
        }
    }

    fn zeroed_slot(&self, b: &mut FunctionBuilder, chunks: u32, align: u32) -> StackSlot {
        let ss = staging_slot(b, chunks * CHUNK_BYTES, align);
        let zero = b.ins().iconst(I64, 0);
        for i in 0..chunks {
            b.ins().stack_store(zero, ss, (i * CHUNK_BYTES) as i32);
        }
        ss
    }
}
