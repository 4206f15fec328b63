//! The far-call gate entry.
//!
//! User space reaches the kernel by far-calling through a call-gate
//! descriptor; the gate lands on [`api_gate_entry`], which saves the
//! caller's registers and hands control to [`api_gate_handler`]. The
//! handler finds the caller's argument array -- directly on our stack
//! when the caller was already at kernel privilege, or on the user
//! stack captured by the privilege switch -- copies it into kernel
//! memory, and dispatches through [`process_call`](super::process_call).
//!
//! The whole module is specific to the kernel target; nothing here has
//! host-side behaviour.

#![cfg(all(target_arch = "x86", target_os = "none"))]

use super::{API_MAX_ARGS, userptr::UserSlice};
use crate::status::Status;

/// GDT selector of the API call gate, as published to user space.
pub const API_GATE_SELECTOR: u16 = 0x3B;

// The gate entry: save the caller's registers, recover its CS and the
// location where its arguments start, dispatch, patch the saved EAX
// with the return value, and far-return.
core::arch::global_asm!(
    r"
    .section .text
    .global api_gate_entry
    .type api_gate_entry, @function
api_gate_entry:
    pusha
    mov  eax, [esp + 36]    # caller CS pushed by the far call
    lea  edx, [esp + 40]    # first dword past the far return frame
    push edx
    push eax
    call api_gate_handler
    add  esp, 8
    mov  [esp + 28], eax    # saved EAX slot of the pusha frame
    popa
    lret
    .size api_gate_entry, . - api_gate_entry
"
);

/// Dispatch one gate entry.
///
/// `caller_cs` is the code segment the far call pushed; its RPL bits
/// say whether a privilege switch happened. `frame_past_return` points
/// just past the far-return frame on the kernel stack: for a
/// same-privilege caller the argument array starts there, for a user
/// caller that location holds the captured user ESP, which in turn
/// points at the argument array.
#[unsafe(no_mangle)]
extern "C" fn api_gate_handler(caller_cs: u32, frame_past_return: u32) -> i32 {
    let from_user = caller_cs & 0x3 != 0;

    let args_addr = if from_user {
        // SAFETY: the CPU pushed the user ESP at this location during
        // the privilege switch.
        unsafe { core::ptr::read(frame_past_return as *const u32) }
    } else {
        frame_past_return
    };

    match copy_args(args_addr, from_user) {
        Ok(args) => super::process_call(&args[..]),
        Err(status) => status.code(),
    }
}

/// Copy the caller's argument array into kernel memory.
///
/// The first word is the argument count plus one; at most
/// `2 + API_MAX_ARGS` words are ever read.
fn copy_args(args_addr: u32, from_user: bool) -> Result<[u32; 2 + API_MAX_ARGS], Status> {
    let mut args = [0u32; 2 + API_MAX_ARGS];

    if from_user {
        // A user pointer gets the same validation as every other API
        // pointer argument.
        let slice = UserSlice::new(args_addr, 4)?;
        // SAFETY: validated; the caller's address space is current.
        let head = unsafe { core::ptr::read(slice.addr() as *const u32) };
        let words = (head as usize).min(2 + API_MAX_ARGS).max(1) + 1;
        let full = UserSlice::new(args_addr, (words * 4) as u32)?;
        // SAFETY: validated range covering the declared argument count.
        let bytes = unsafe { full.read_bytes() };
        for (index, chunk) in bytes.chunks_exact(4).enumerate().take(args.len()) {
            args[index] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    } else {
        // Kernel-privilege caller: the array is on our own stack.
        for (index, slot) in args.iter_mut().enumerate() {
            // SAFETY: reading the caller's frame, bounded by the fixed
            // array size; process_call validates the declared count.
            *slot = unsafe { core::ptr::read((args_addr as usize + index * 4) as *const u32) };
        }
    }

    Ok(args)
}
