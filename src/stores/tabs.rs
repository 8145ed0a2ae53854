use super::common::{JobResults, SessionBinding, SessionStatus};
use std::collections::BTreeMap;

/// 一个标签页：一份表单 + 一份结果，至多绑定一个会话
#[derive(Debug, Clone)]
pub struct Tab<F, R> {
    pub id: u32,
    pub name: String,
    pub session: Option<SessionBinding>,
    pub form: F,
    pub results: R,
}

impl<F, R> Tab<F, R> {
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// 绑定新会话，替换旧的
    pub fn bind_session(&mut self, id: String) {
        self.session = Some(SessionBinding::new(id));
    }

    pub fn mark_finished(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.finished_at.is_none() {
                session.finished_at = Some(chrono::Utc::now());
            }
        }
    }
}

impl<F, R: JobResults> Tab<F, R> {
    pub fn status(&self) -> SessionStatus {
        self.results.status()
    }

    /// 任务正常结束，展示结果
    pub fn finish(&mut self) {
        self.results.set_executing(false);
        self.results.set_show_results(true);
        self.mark_finished();
    }

    /// 收到 termination；只有仍在执行时才生效，返回 true 表示需要提示
    pub fn terminate(&mut self) -> bool {
        if !self.results.executing() {
            return false;
        }
        self.results.set_executing(false);
        self.results.set_terminated(true);
        self.mark_finished();
        true
    }
}

/// 标签页集合；id 单调递增，永不复用
#[derive(Debug, Clone)]
pub struct TabSet<F, R> {
    tabs: BTreeMap<u32, Tab<F, R>>,
    last_id: u32,
}

impl<F, R> TabSet<F, R> {
    /// 创建时即包含 1 号标签页
    pub fn new(form: F, results: R) -> Self {
        let mut set = Self {
            tabs: BTreeMap::new(),
            last_id: 0,
        };
        set.insert(form, results);
        set
    }

    pub fn insert(&mut self, form: F, results: R) -> u32 {
        self.last_id += 1;
        let id = self.last_id;
        self.tabs.insert(
            id,
            Tab {
                id,
                name: format!("Tab {}", id),
                session: None,
                form,
                results,
            },
        );
        id
    }

    pub fn get(&self, id: u32) -> Option<&Tab<F, R>> {
        self.tabs.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Tab<F, R>> {
        self.tabs.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.tabs.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tab<F, R>> {
        self.tabs.values()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// 按会话 id 线性查找（标签页数量很小）
    pub fn find_by_session(&mut self, session_id: &str) -> Option<&mut Tab<F, R>> {
        self.tabs
            .values_mut()
            .find(|tab| tab.session_id() == Some(session_id))
    }

    pub fn tab_id_by_session(&self, session_id: &str) -> Option<u32> {
        self.tabs
            .values()
            .find(|tab| tab.session_id() == Some(session_id))
            .map(|tab| tab.id)
    }
}

impl<F, R: JobResults> TabSet<F, R> {
    /// 回到配置界面
    pub fn hide_results(&mut self, id: u32) {
        if let Some(tab) = self.tabs.get_mut(&id) {
            tab.results.set_show_results(false);
        }
    }

    /// 取消前的本地处理。已报错或没有绑定会话时只在本地复位并返回 `None`，
    /// 否则返回要通知后端取消的会话 id
    pub fn cancel_target(&mut self, id: u32) -> Option<String> {
        let tab = self.tabs.get_mut(&id)?;
        // 已经报错的任务后端早已结束
        if tab.results.exception().is_set() || tab.session.is_none() {
            tab.results.set_executing(false);
            return None;
        }
        tab.session_id().map(str::to_string)
    }

    /// 启动请求失败，复位仍绑定该会话的标签页
    pub fn stop_session(&mut self, session_id: &str) {
        if let Some(tab) = self.find_by_session(session_id) {
            tab.results.set_executing(false);
        }
    }
}

impl<F: Clone, R: Default> TabSet<F, R> {
    /// 复制表单到新标签页，结果为空
    pub fn duplicate(&mut self, source_id: u32) -> Option<u32> {
        let form = self.get(source_id)?.form.clone();
        Some(self.insert(form, R::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::common::{impl_job_results, Exception};

    #[test]
    fn seeded_with_tab_one_and_ids_are_monotonic() {
        let mut set: TabSet<(), ()> = TabSet::new((), ());
        assert_eq!(set.ids(), vec![1]);
        assert_eq!(set.insert((), ()), 2);
        assert_eq!(set.insert((), ()), 3);
        assert_eq!(set.get(3).unwrap().name, "Tab 3");
    }

    #[test]
    fn binding_replaces_previous_session() {
        let mut set: TabSet<(), ()> = TabSet::new((), ());
        let tab = set.get_mut(1).unwrap();
        tab.bind_session("a".to_string());
        tab.bind_session("b".to_string());

        assert!(set.find_by_session("a").is_none());
        assert_eq!(set.find_by_session("b").unwrap().id, 1);
        assert_eq!(set.tab_id_by_session("b"), Some(1));
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Results {
        executing: bool,
        show_results: bool,
        terminated: bool,
        exception: Exception,
    }
    impl_job_results!(Results);

    fn running() -> TabSet<String, Results> {
        let mut set = TabSet::new("form".to_string(), Results::default());
        let tab = set.get_mut(1).unwrap();
        tab.bind_session("s1".to_string());
        tab.results.executing = true;
        set
    }

    #[test]
    fn terminate_only_once() {
        let mut set = running();
        let tab = set.get_mut(1).unwrap();
        assert!(tab.terminate());
        assert!(!tab.terminate());
        assert_eq!(tab.status(), SessionStatus::Terminated);
        assert!(tab.session.as_ref().unwrap().finished_at.is_some());
    }

    #[test]
    fn finish_shows_results() {
        let mut set = running();
        set.get_mut(1).unwrap().finish();
        assert_eq!(set.get(1).unwrap().status(), SessionStatus::Completed);

        set.hide_results(1);
        assert!(!set.get(1).unwrap().results.show_results);
    }

    #[test]
    fn cancel_target_resets_locally_when_nothing_to_cancel() {
        let mut set = running();
        assert_eq!(set.cancel_target(1), Some("s1".to_string()));
        assert!(set.get(1).unwrap().results.executing);

        set.get_mut(1).unwrap().results.exception.error = "boom".to_string();
        assert_eq!(set.cancel_target(1), None);
        assert!(!set.get(1).unwrap().results.executing);

        let id = set.insert("other".to_string(), Results { executing: true, ..Results::default() });
        assert_eq!(set.cancel_target(id), None);
        assert!(!set.get(id).unwrap().results.executing);
        assert_eq!(set.cancel_target(99), None);
    }

    #[test]
    fn duplicate_copies_form_with_empty_results() {
        let mut set = running();
        let id = set.duplicate(1).unwrap();
        let copy = set.get(id).unwrap();
        assert_eq!(copy.form, "form");
        assert_eq!(copy.results, Results::default());
        assert!(copy.session.is_none());
        assert!(set.duplicate(42).is_none());
    }

    #[test]
    fn stop_session_ignores_rebound_tabs() {
        let mut set = running();
        set.get_mut(1).unwrap().bind_session("s2".to_string());
        set.stop_session("s1");
        assert!(set.get(1).unwrap().results.executing);
        set.stop_session("s2");
        assert!(!set.get(1).unwrap().results.executing);
    }

    #[test]
    fn unknown_session_finds_nothing() {
        let mut set: TabSet<(), ()> = TabSet::new((), ());
        assert!(set.find_by_session("nope").is_none());
    }
}
