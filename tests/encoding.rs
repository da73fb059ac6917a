use lisp_jit::prelude::*;

use rstest::rstest;

/// Run one emitter operation against a fresh region and collect the
/// bytes it produced.
fn emitted(emit: impl FnOnce(&mut Emitter)) -> Vec<u8> {
    let mut buffer = ExecBuffer::new(4096);
    let mut emitter = Emitter::new(&mut buffer);
    emit(&mut emitter);
    let len = emitter.position();
    buffer.code(len).to_vec()
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn mov_reg_imm32_is_b8_plus_reg(#[case] reg: Register) {
    let expected = vec![0xb8 + reg as u8, 0x2a, 0x00, 0x00, 0x00];
    assert_eq!(emitted(|e| e.mov_reg_imm32(reg, 42)), expected);
}

#[rstest]
#[case(Register::Rax, Register::Rax, 0xc0)]
#[case(Register::Rax, Register::Rsi, 0xf0)]
#[case(Register::Rdi, Register::Rbp, 0xef)]
#[case(Register::Rsi, Register::Rdi, 0xfe)]
fn mov_reg_reg_uses_rex_w(#[case] dst: Register, #[case] src: Register, #[case] modrm: u8) {
    assert_eq!(emitted(|e| e.mov_reg_reg(dst, src)), vec![0x48, 0x89, modrm]);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn store_stack_is_rsp_relative_disp8(#[case] src: Register) {
    let expected = vec![0x48, 0x89, 0x44 + (src as u8) * 8, 0x24, 0xf8];
    assert_eq!(emitted(|e| e.store_stack(-8, src)), expected);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn load_stack_is_rsp_relative_disp8(#[case] dst: Register) {
    let expected = vec![0x48, 0x8b, 0x44 + (dst as u8) * 8, 0x24, 0xf0];
    assert_eq!(emitted(|e| e.load_stack(dst, -16)), expected);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn store_indirect_covers_pair_slots(#[case] base: Register) {
    let expected = vec![0x48, 0x89, 0x40 + base as u8, 0x08];
    assert_eq!(emitted(|e| e.store_indirect(base, 8)), expected);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn load_indirect_covers_car_and_cdr(#[case] base: Register) {
    let car = vec![0x48, 0x8b, 0x40 + base as u8, 0xff];
    assert_eq!(emitted(|e| e.load_indirect(base, -1)), car);

    let cdr = vec![0x48, 0x8b, 0x40 + base as u8, 0x07];
    assert_eq!(emitted(|e| e.load_indirect(base, 7)), cdr);
}

#[test]
#[should_panic(expected = "rsp-based stores go through store_stack")]
fn store_indirect_rejects_rsp() {
    emitted(|e| e.store_indirect(Register::Rsp, 0));
}

#[test]
fn add_rax_takes_the_short_form() {
    assert_eq!(
        emitted(|e| e.add_reg_imm32(Register::Rax, 4)),
        vec![0x05, 0x04, 0x00, 0x00, 0x00]
    );
}

#[rstest]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn add_other_registers_take_the_long_form(#[case] reg: Register) {
    let expected = vec![0x81, 0xc0 + reg as u8, 0x10, 0x00, 0x00, 0x00];
    assert_eq!(emitted(|e| e.add_reg_imm32(reg, 16)), expected);
}

#[test]
fn sub_rax_takes_the_short_form() {
    assert_eq!(
        emitted(|e| e.sub_reg_imm32(Register::Rax, 4)),
        vec![0x2d, 0x04, 0x00, 0x00, 0x00]
    );
}

#[rstest]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn sub_other_registers_take_the_long_form(#[case] reg: Register) {
    let expected = vec![0x81, 0xe8 + reg as u8, 0x18, 0x00, 0x00, 0x00];
    assert_eq!(emitted(|e| e.sub_reg_imm32(reg, 24)), expected);
}

#[test]
fn and_or_rax_take_the_short_forms() {
    assert_eq!(
        emitted(|e| e.and_reg_imm32(Register::Rax, 0xff)),
        vec![0x25, 0xff, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        emitted(|e| e.or_reg_imm32(Register::Rax, 0x0f)),
        vec![0x0d, 0x0f, 0x00, 0x00, 0x00]
    );
}

#[rstest]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn and_or_other_registers_take_the_long_forms(#[case] reg: Register) {
    assert_eq!(
        emitted(|e| e.and_reg_imm32(reg, 0xff)),
        vec![0x81, 0xe0 + reg as u8, 0xff, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        emitted(|e| e.or_reg_imm32(reg, 0x0f)),
        vec![0x81, 0xc8 + reg as u8, 0x0f, 0x00, 0x00, 0x00]
    );
}

#[test]
fn cmp_rax_takes_the_short_form() {
    assert_eq!(
        emitted(|e| e.cmp_reg_imm32(Register::Rax, 0x1f)),
        vec![0x3d, 0x1f, 0x00, 0x00, 0x00]
    );
}

#[rstest]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn cmp_other_registers_take_the_long_form(#[case] reg: Register) {
    let expected = vec![0x81, 0xf8 + reg as u8, 0x1f, 0x00, 0x00, 0x00];
    assert_eq!(emitted(|e| e.cmp_reg_imm32(reg, 0x1f)), expected);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn add_reg_stack_reads_a_spilled_slot(#[case] dst: Register) {
    let expected = vec![0x48, 0x03, 0x44 + (dst as u8) * 8, 0x24, 0xf8];
    assert_eq!(emitted(|e| e.add_reg_stack(dst, -8)), expected);
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn shl_reg_imm8(#[case] reg: Register) {
    let expected = vec![0x48, 0xc1, 0xe0 + reg as u8, 0x06];
    assert_eq!(emitted(|e| e.shl_reg_imm8(reg, 6)), expected);
}

#[test]
#[should_panic(expected = "shift count out of range")]
fn shl_rejects_oversized_counts() {
    emitted(|e| e.shl_reg_imm8(Register::Rax, 64));
}

#[test]
fn sete_al_sets_the_low_byte() {
    assert_eq!(emitted(|e| e.sete_al()), vec![0x0f, 0x94, 0xc0]);
}

#[test]
fn jumps_carry_rel32_displacements() {
    assert_eq!(
        emitted(|e| {
            e.je(0);
        }),
        vec![0x0f, 0x84, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        emitted(|e| {
            e.jmp(0);
        }),
        vec![0xe9, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn call_displacement_is_relative_to_the_end_of_the_instruction() {
    // Forward: target 16 from position 0, rel32 = 16 - 5.
    assert_eq!(
        emitted(|e| e.call(16)),
        vec![0xe8, 0x0b, 0x00, 0x00, 0x00]
    );
    // Backward: target 0 from position 0, rel32 = -5.
    assert_eq!(
        emitted(|e| e.call(0)),
        vec![0xe8, 0xfb, 0xff, 0xff, 0xff]
    );
}

#[rstest]
#[case(Register::Rax)]
#[case(Register::Rcx)]
#[case(Register::Rdx)]
#[case(Register::Rbx)]
#[case(Register::Rsp)]
#[case(Register::Rbp)]
#[case(Register::Rsi)]
#[case(Register::Rdi)]
fn inc_dec_reg(#[case] reg: Register) {
    assert_eq!(
        emitted(|e| e.inc_reg(reg)),
        vec![0x48, 0xff, 0xc0 + reg as u8]
    );
    assert_eq!(
        emitted(|e| e.dec_reg(reg)),
        vec![0x48, 0xff, 0xc8 + reg as u8]
    );
}

#[test]
fn patch_jump_writes_the_distance_to_the_cursor() {
    let bytes = emitted(|e| {
        let jump = e.jmp(0);
        e.mov_reg_imm32(Register::Rax, 42);
        e.patch_jump(jump);
    });
    // jmp skips the 5-byte mov that follows it.
    assert_eq!(bytes[..5], [0xe9, 0x05, 0x00, 0x00, 0x00]);
}

#[test]
#[should_panic(expected = "stack displacement out of disp8 range")]
fn stack_displacements_past_disp8_are_fatal() {
    emitted(|e| e.store_stack(-136, Register::Rax));
}

// The hand-assembled smoke tests the first emitter iteration shipped
// with: raw bytes in, native result out.

#[test]
fn hand_written_unit_executes() {
    let mut buffer = ExecBuffer::new(4096);
    // mov eax, 42; ret
    for (pos, byte) in [0xb8, 0x2a, 0x00, 0x00, 0x00, 0xc3].into_iter().enumerate() {
        buffer.at_put(pos, byte);
    }
    buffer.make_executable();

    let mut heap = Heap::with_words(1);
    // Safety: the region holds a complete function ending in ret.
    let result = unsafe { (buffer.as_entry())(heap.base_ptr()) };
    assert_eq!(result, 42);
}

#[test]
fn emitted_mov_inc_executes() {
    let mut buffer = ExecBuffer::new(4096);
    {
        let mut emitter = Emitter::new(&mut buffer);
        emitter.mov_reg_imm32(Register::Rax, 42);
        emitter.inc_reg(Register::Rax);
        emitter.ret();
    }
    buffer.make_executable();

    let mut heap = Heap::with_words(1);
    // Safety: the region holds a complete function ending in ret.
    let result = unsafe { (buffer.as_entry())(heap.base_ptr()) };
    assert_eq!(result, 43);
}
