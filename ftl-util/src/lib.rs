//! 内核公共组件: 错误码, 自旋锁与睡眠锁, 数组链表
#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod error;
pub mod list;
pub mod sync;
