//! Code generation
//!
//! A single pass over the AST emits machine code directly: no
//! intermediate representation, no later fixups except the 32-bit
//! displacements of forward jumps, which are back-patched once the join
//! point is reached.
//!
//! Evaluation is stack-based. `stack_index` is the next free slot, a
//! negative byte offset from `rsp`, starting at `-8` in every entry;
//! each temporary spill decrements it by one word. Results always land
//! in `rax`, and `rsi` is the heap allocation pointer seeded from `rdi`
//! by the entry prologue.

use crate::asm::{Emitter, Register};
use crate::ast::AstNode;
use crate::consts::{
    BOOL_SHIFT, BOOL_TAG, CAR_OFFSET, CDR_OFFSET, CHAR_SHIFT, CHAR_TAG, FIXNUM_SHIFT, PAIR_SIZE,
    PAIR_TAG, WORD_SIZE,
};
use crate::env::{Bindings, Scope};
use crate::error::CompileError;
use crate::value::Value;

use tracing::trace;

/// One evaluation-stack slot, in bytes.
const SLOT_SIZE: i32 = WORD_SIZE as i32;

/// Displacement emitted for a forward jump before its target is known.
const JUMP_PLACEHOLDER: i32 = 0;

/// Walks an AST and emits the program into the borrowed buffer.
///
/// Two disjoint binding chains thread through compilation: locals map
/// names to stack slots, labels map names to code offsets. Both live in
/// one arena owned here; the `Copy` scope handles travel down the
/// recursion.
pub struct Compiler<'b> {
    emit: Emitter<'b>,
    env: Bindings,
}

impl<'b> Compiler<'b> {
    pub fn new(emit: Emitter<'b>) -> Self {
        Self {
            emit,
            env: Bindings::new(),
        }
    }

    /// Bytes emitted so far.
    pub fn position(&self) -> usize {
        self.emit.position()
    }

    /// Compile a whole unit: a `(labels (…) body)` program, or a bare
    /// expression as an implicit entry.
    pub fn compile_program(&mut self, node: &AstNode) -> Result<(), CompileError> {
        if let AstNode::Pair(head, rest) = node {
            if head.as_atom() == Some("labels") {
                return self.compile_labels(rest);
            }
        }
        self.compile_entry(node, Scope::EMPTY)
    }

    /// `(labels ((L₁ e₁) …) body)`: jump over the label region, lay the
    /// label bodies out sequentially, then patch the jump and emit the
    /// entry. Each name is bound before its body compiles, so a body
    /// may call itself or any earlier label.
    fn compile_labels(&mut self, rest: &AstNode) -> Result<(), CompileError> {
        let bindings = rest.car();
        let body = rest.cdr().car();

        let to_entry = self.emit.jmp(JUMP_PLACEHOLDER);

        let mut labels = Scope::EMPTY;
        for binding in bindings.iter() {
            let name = match binding.car().as_atom() {
                Some(name) => name.to_owned(),
                None => panic!("label name must be an atom: {}", binding),
            };
            labels = self.env.extend(labels, &name, self.emit.position() as i32);
            self.compile_code(binding.cdr().car(), labels)?;
        }

        self.emit.patch_jump(to_entry);
        self.compile_entry(body, labels)
    }

    /// The fixed entry preamble, the unit body, and `ret`. The first
    /// argument arrives in `rdi` and becomes the heap pointer in `rsi`.
    fn compile_entry(&mut self, body: &AstNode, labels: Scope) -> Result<(), CompileError> {
        self.emit.mov_reg_reg(Register::Rsi, Register::Rdi);
        self.compile_expr(body, -SLOT_SIZE, Scope::EMPTY, labels)?;
        self.emit.ret();
        Ok(())
    }

    /// `(code (x₁ … xₙ) body)`: a function body. Formals occupy the
    /// slots the caller staged them in, `-8, -16, …` from the callee's
    /// `rsp`; locals start fresh, labels are inherited.
    fn compile_code(&mut self, node: &AstNode, labels: Scope) -> Result<(), CompileError> {
        if node.car().as_atom() != Some("code") {
            panic!("label body must be a code form: {}", node);
        }
        let formals = node.cdr().car();
        let body = node.cdr().cdr().car();

        let mut locals = Scope::EMPTY;
        let mut stack_index = -SLOT_SIZE;
        for formal in formals.iter() {
            let name = match formal.as_atom() {
                Some(name) => name,
                None => panic!("formal must be an atom: {}", formal),
            };
            locals = self.env.extend(locals, name, stack_index);
            stack_index -= SLOT_SIZE;
        }

        self.compile_expr(body, stack_index, locals, labels)?;
        self.emit.ret();
        Ok(())
    }

    fn compile_expr(
        &mut self,
        node: &AstNode,
        stack_index: i32,
        locals: Scope,
        labels: Scope,
    ) -> Result<(), CompileError> {
        trace!("compiling {}", node);

        match node {
            AstNode::Fixnum(n) => {
                self.emit
                    .mov_reg_imm32(Register::Rax, Value::fixnum(*n) as i32);
                Ok(())
            }
            AstNode::Atom(name) => match self.env.lookup(locals, name) {
                Some(offset) => {
                    self.emit.load_stack(Register::Rax, offset);
                    Ok(())
                }
                None => Err(CompileError::UnboundVariable(name.clone())),
            },
            AstNode::Pair(head, args) => {
                self.compile_call(head, args, stack_index, locals, labels)
            }
            AstNode::Nil => {
                self.emit.mov_reg_imm32(Register::Rax, Value::NIL as i32);
                Ok(())
            }
        }
    }

    /// `(head arg…)`, dispatched on the head atom.
    fn compile_call(
        &mut self,
        head: &AstNode,
        args: &AstNode,
        stack_index: i32,
        locals: Scope,
        labels: Scope,
    ) -> Result<(), CompileError> {
        let name = match head.as_atom() {
            Some(name) => name,
            None => panic!("unknown call: {}", head),
        };

        match name {
            "add1" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit
                    .add_reg_imm32(Register::Rax, Value::fixnum(1) as i32);
                Ok(())
            }

            "sub1" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit
                    .sub_reg_imm32(Register::Rax, Value::fixnum(1) as i32);
                Ok(())
            }

            "integer->char" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit
                    .shl_reg_imm8(Register::Rax, (CHAR_SHIFT - FIXNUM_SHIFT) as u8);
                self.emit.or_reg_imm32(Register::Rax, CHAR_TAG as i32);
                Ok(())
            }

            "zero?" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit.cmp_reg_imm32(Register::Rax, 0);
                self.emit.mov_reg_imm32(Register::Rax, 0);
                self.emit.sete_al();
                self.emit.shl_reg_imm8(Register::Rax, BOOL_SHIFT as u8);
                self.emit.or_reg_imm32(Register::Rax, BOOL_TAG as i32);
                Ok(())
            }

            "+" => {
                // Last operand first: b spills to the free slot, a lands
                // in rax, the add re-reads the slot.
                self.compile_expr(args.cdr().car(), stack_index, locals, labels)?;
                self.emit.store_stack(stack_index, Register::Rax);
                self.compile_expr(args.car(), stack_index - SLOT_SIZE, locals, labels)?;
                self.emit.add_reg_stack(Register::Rax, stack_index);
                Ok(())
            }

            "let" => self.compile_let(args.car(), args.cdr().car(), stack_index, locals, labels),

            "if" => self.compile_if(
                args.car(),
                args.cdr().car(),
                args.cdr().cdr().car(),
                stack_index,
                locals,
                labels,
            ),

            "cons" => {
                self.compile_expr(args.car(), stack_index - SLOT_SIZE, locals, labels)?;
                self.emit.store_indirect(Register::Rsi, 0);
                self.compile_expr(args.cdr().car(), stack_index, locals, labels)?;
                self.emit.store_indirect(Register::Rsi, SLOT_SIZE);
                self.emit.mov_reg_reg(Register::Rax, Register::Rsi);
                self.emit.or_reg_imm32(Register::Rax, PAIR_TAG as i32);
                self.emit.add_reg_imm32(Register::Rsi, PAIR_SIZE as i32);
                Ok(())
            }

            "car" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit.load_indirect(Register::Rax, CAR_OFFSET);
                Ok(())
            }

            "cdr" => {
                self.compile_expr(args.car(), stack_index, locals, labels)?;
                self.emit.load_indirect(Register::Rax, CDR_OFFSET);
                Ok(())
            }

            "labelcall" => {
                self.compile_labelcall(args.car(), args.cdr(), stack_index, locals, labels)
            }

            _ => panic!("unknown call: {}", name),
        }
    }

    /// `(let ((x₁ e₁) …) body)`, sequentially: each init sees the
    /// bindings before it, each bound value parks in its own slot and is
    /// re-read on reference.
    fn compile_let(
        &mut self,
        bindings: &AstNode,
        body: &AstNode,
        stack_index: i32,
        locals: Scope,
        labels: Scope,
    ) -> Result<(), CompileError> {
        let mut stack_index = stack_index;
        let mut scope = locals;

        for binding in bindings.iter() {
            let name = match binding.car().as_atom() {
                Some(name) => name.to_owned(),
                None => panic!("let binding name must be an atom: {}", binding),
            };
            self.compile_expr(binding.cdr().car(), stack_index, scope, labels)?;
            self.emit.store_stack(stack_index, Register::Rax);
            scope = self.env.extend(scope, &name, stack_index);
            stack_index -= SLOT_SIZE;
        }

        self.compile_expr(body, stack_index, scope, labels)
    }

    /// `(if test then else)` with two back-patched forward jumps. Any
    /// value other than boolean false takes the then-branch, nil and
    /// zero included.
    fn compile_if(
        &mut self,
        test: &AstNode,
        then: &AstNode,
        otherwise: &AstNode,
        stack_index: i32,
        locals: Scope,
        labels: Scope,
    ) -> Result<(), CompileError> {
        self.compile_expr(test, stack_index, locals, labels)?;
        self.emit
            .cmp_reg_imm32(Register::Rax, Value::boolean(false) as i32);
        let to_else = self.emit.je(JUMP_PLACEHOLDER);

        self.compile_expr(then, stack_index, locals, labels)?;
        let to_join = self.emit.jmp(JUMP_PLACEHOLDER);

        self.emit.patch_jump(to_else);
        self.compile_expr(otherwise, stack_index, locals, labels)?;
        self.emit.patch_jump(to_join);
        Ok(())
    }

    /// `(labelcall L a₁ … aₙ)`: stage the arguments left to right into
    /// the slots below the return-address slot, then a direct relative
    /// call. From a depth past the entry slot the call is bracketed by
    /// an `rsp` adjustment so the callee's formal offsets line up.
    fn compile_labelcall(
        &mut self,
        target: &AstNode,
        args: &AstNode,
        stack_index: i32,
        locals: Scope,
        labels: Scope,
    ) -> Result<(), CompileError> {
        let name = match target.as_atom() {
            Some(name) => name,
            None => panic!("labelcall target must be an atom: {}", target),
        };
        let code_offset = self
            .env
            .lookup(labels, name)
            .ok_or_else(|| CompileError::UnboundLabel(name.to_owned()))?;

        let mut arg_index = stack_index - SLOT_SIZE;
        for arg in args.iter() {
            self.compile_expr(arg, arg_index, locals, labels)?;
            self.emit.store_stack(arg_index, Register::Rax);
            arg_index -= SLOT_SIZE;
        }

        let adjust = stack_index + SLOT_SIZE;
        if adjust < 0 {
            self.emit.sub_reg_imm32(Register::Rsp, -adjust);
        }
        self.emit.call(code_offset as usize);
        if adjust < 0 {
            self.emit.add_reg_imm32(Register::Rsp, -adjust);
        }
        Ok(())
    }
}
