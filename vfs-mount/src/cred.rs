/// 进程凭证, 只用于传递给文件系统和鉴权钩子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cred {
    pub uid: u32,
    pub gid: u32,
}

impl Cred {
    /// 内核自身使用的凭证
    pub const KERNEL: Cred = Cred { uid: 0, gid: 0 };

    pub const fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}
