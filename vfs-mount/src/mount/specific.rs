//! 挂载点附加数据
//!
//! 键在 `SpecificDomain` 中全局分配, 每个挂载点持有一张值表.
//! 键被删除后槽位可以复用, 代数不同的旧键不会读到新值.

use core::any::Any;

use alloc::{sync::Arc, vec::Vec};
use ftl_util::{
    error::{SysError, SysR},
    sync::{spin_mutex::SpinMutex, Spin},
};

pub type SpecificValue = Arc<dyn Any + Send + Sync>;
/// 挂载点销毁时对仍然存在的值调用
pub type SpecificDtor = fn(SpecificValue);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecificKey {
    index: usize,
    gen: u32,
}

struct KeySlot {
    gen: u32,
    live: bool,
    dtor: Option<SpecificDtor>,
}

pub struct SpecificDomain {
    keys: SpinMutex<Vec<KeySlot>, Spin>,
}

impl SpecificDomain {
    pub const fn new() -> Self {
        Self {
            keys: SpinMutex::new(Vec::new()),
        }
    }
    pub fn key_create(&self, dtor: Option<SpecificDtor>) -> SysR<SpecificKey> {
        let mut keys = self.keys.lock();
        if let Some(index) = keys.iter().position(|s| !s.live) {
            let slot = &mut keys[index];
            slot.gen = slot.gen.wrapping_add(1);
            slot.live = true;
            slot.dtor = dtor;
            return Ok(SpecificKey {
                index,
                gen: slot.gen,
            });
        }
        keys.try_reserve(1).map_err(|_| SysError::ENOMEM)?;
        let index = keys.len();
        keys.push(KeySlot {
            gen: 0,
            live: true,
            dtor,
        });
        Ok(SpecificKey { index, gen: 0 })
    }
    /// 已经保存的值不会调用析构函数, 挂载点销毁时直接释放
    pub fn key_delete(&self, key: SpecificKey) -> SysR<()> {
        let mut keys = self.keys.lock();
        match keys.get_mut(key.index) {
            Some(slot) if slot.live && slot.gen == key.gen => {
                slot.live = false;
                slot.dtor = None;
                Ok(())
            }
            _ => Err(SysError::EINVAL),
        }
    }
    fn is_live(&self, key: SpecificKey) -> bool {
        matches!(self.keys.lock().get(key.index), Some(s) if s.live && s.gen == key.gen)
    }
    /// 键已失效返回None
    fn dtor(&self, key: SpecificKey) -> Option<Option<SpecificDtor>> {
        match self.keys.lock().get(key.index) {
            Some(s) if s.live && s.gen == key.gen => Some(s.dtor),
            _ => None,
        }
    }
}

impl Default for SpecificDomain {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct SpecificTable {
    domain: Arc<SpecificDomain>,
    values: SpinMutex<Vec<Option<(SpecificKey, SpecificValue)>>, Spin>,
}

impl SpecificTable {
    pub fn new(domain: Arc<SpecificDomain>) -> Self {
        Self {
            domain,
            values: SpinMutex::new(Vec::new()),
        }
    }
    pub fn get(&self, key: SpecificKey) -> Option<SpecificValue> {
        if !self.domain.is_live(key) {
            return None;
        }
        match self.values.lock().get(key.index) {
            Some(Some((k, v))) if *k == key => Some(v.clone()),
            _ => None,
        }
    }
    pub fn set(&self, key: SpecificKey, value: Option<SpecificValue>) -> SysR<Option<SpecificValue>> {
        if !self.domain.is_live(key) {
            return Err(SysError::EINVAL);
        }
        let mut values = self.values.lock();
        if values.len() <= key.index {
            if value.is_none() {
                return Ok(None);
            }
            values.resize_with(key.index + 1, || None);
        }
        let old = match value {
            Some(v) => values[key.index].replace((key, v)),
            None => values[key.index].take(),
        };
        // 旧代数的残留值对新键不可见
        Ok(old.and_then(|(k, v)| (k == key).then(|| v)))
    }
    /// 对每个仍然有效的值调用析构函数
    pub fn fini(&mut self) {
        let values = core::mem::take(self.values.get_mut());
        for (key, value) in values.into_iter().flatten() {
            if let Some(Some(dtor)) = self.domain.dtor(key) {
                dtor(value);
            }
        }
    }
}
