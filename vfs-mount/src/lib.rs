//!
//! 虚拟文件系统的挂载核心: 挂载点注册表, 挂载点的引用计数和 busy,
//! 挂载点vnode链表, 挂载与卸载, 根文件系统挂载.
//!
#![no_std]

extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate std;

pub use {
    config::VfsConfig,
    cred::Cred,
    fssp::{ExtAttrCmd, FsModuleLoader, FsTypeRef, StatVfs, VfsOps},
    fstrans::TransactionGate,
    manager::{Authorizer, NameCache, NoNameCache, PermitAll, VfsManager},
    mount::{
        iter::MountIter,
        manager::MountManager,
        specific::{SpecificDtor, SpecificKey, SpecificValue},
        IMntFlags, MntFlags, Mount, MountBusy,
    },
    proc::{CwdInfo, ProcTable},
    vnode::{
        flush::FlushFlags, iter::VnodeIter, VState, VType, Vnode, VnodeAttr, VnodeFlags,
        VnodeOps, VnodeRef,
    },
};

pub mod config;
mod cred;
mod fssp;
mod fstrans;
mod manager;
mod mount;
mod proc;
mod syncer;
#[cfg(test)]
mod test;
mod vnode;
