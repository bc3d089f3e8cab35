//! 仓储与外部协作方的内存实现
//!
//! 这些实现不依赖数据库、协调存储或真实的外部数据源，
//! 同时暴露计数与记录接口，便于在测试中断言副作用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_core::{
    models::{
        Actor, CronJob, DataSourceConfig, Dialect, EntityKind, JobStatus, JobType, Permission,
        QueryColumn, TableInfo,
    },
    traits::{
        CronJobRepository, DataSourceRepository, DataStoreDriver, DataStorePool,
        DataStorePoolOptions, FireHandler, JobPayloadExecutor, PermissionGate, TriggerScheduler,
    },
    Clock, HubError, HubResult,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 数据源仓储的内存实现
///
/// 与真实仓储不同，这里不检查名称唯一，用于验证上层的加锁流程。
#[derive(Clone, Default)]
pub struct MockDataSourceRepository {
    sources: Arc<Mutex<HashMap<i64, DataSourceConfig>>>,
    next_id: Arc<Mutex<i64>>,
    write_delay: Option<Duration>,
    fail_updates: Arc<AtomicBool>,
}

impl MockDataSourceRepository {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Default::default()
        }
    }

    /// 写入前等待，放大并发窗口
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<DataSourceConfig> {
        self.sources.lock().unwrap().values().cloned().collect()
    }

    /// 之后的 `update` 全部返回错误
    pub fn set_update_failure(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataSourceRepository for MockDataSourceRepository {
    async fn create(&self, source: &DataSourceConfig) -> HubResult<DataSourceConfig> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = source.clone();
        created.id = *next_id;
        *next_id += 1;
        self.sources.lock().unwrap().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> HubResult<Option<DataSourceConfig>> {
        Ok(self.sources.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<DataSourceConfig>> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .values()
            .find(|s| s.project_id == project_id && s.name == name)
            .cloned())
    }

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<DataSourceConfig>> {
        let mut sources: Vec<DataSourceConfig> = self
            .sources
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.id);
        Ok(sources)
    }

    async fn update(&self, source: &DataSourceConfig) -> HubResult<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(HubError::internal("db down"));
        }
        let mut sources = self.sources.lock().unwrap();
        match sources.get_mut(&source.id) {
            Some(existing) => {
                *existing = source.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(HubError::not_found("数据源", source.id)),
        }
    }

    async fn delete(&self, id: i64) -> HubResult<()> {
        match self.sources.lock().unwrap().remove(&id) {
            Some(_) => Ok(()),
            None => Err(HubError::not_found("数据源", id)),
        }
    }
}

/// 定时任务仓储的内存实现
#[derive(Clone, Default)]
pub struct MockCronJobRepository {
    jobs: Arc<Mutex<HashMap<i64, CronJob>>>,
    next_id: Arc<Mutex<i64>>,
    write_delay: Option<Duration>,
    fail_status_writes: Arc<AtomicBool>,
}

impl MockCronJobRepository {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Default::default()
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// 之后的 `update_status` 全部返回错误
    pub fn set_status_write_failure(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CronJobRepository for MockCronJobRepository {
    async fn create(&self, job: &CronJob) -> HubResult<CronJob> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = job.clone();
        created.id = *next_id;
        *next_id += 1;
        self.jobs.lock().unwrap().insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> HubResult<Option<CronJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_name(&self, project_id: i64, name: &str) -> HubResult<Option<CronJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|j| j.project_id == project_id && j.name == name)
            .cloned())
    }

    async fn list_by_project(&self, project_id: i64) -> HubResult<Vec<CronJob>> {
        let mut jobs: Vec<CronJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_by_status(&self, status: JobStatus) -> HubResult<Vec<CronJob>> {
        let mut jobs: Vec<CronJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.job_status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn update(&self, job: &CronJob) -> HubResult<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(HubError::not_found("定时任务", job.id)),
        }
    }

    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        failure_reason: Option<&str>,
        updated_by: i64,
    ) -> HubResult<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(HubError::internal("db down"));
        }
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) => {
                job.job_status = status;
                job.failure_reason = failure_reason.map(str::to_string);
                job.updated_by = Some(updated_by);
                job.updated_at = Utc::now();
                Ok(())
            }
            None => Err(HubError::not_found("定时任务", id)),
        }
    }

    async fn delete(&self, id: i64) -> HubResult<()> {
        match self.jobs.lock().unwrap().remove(&id) {
            Some(_) => Ok(()),
            None => Err(HubError::not_found("定时任务", id)),
        }
    }
}

/// 模拟的外部数据库，同一驱动打开的所有连接池共享
#[derive(Default)]
struct MockDatabase {
    tables: HashSet<String>,
    statements: Vec<(String, usize)>,
}

fn unquote(ident: &str) -> String {
    ident
        .trim_matches(|c| c == '"' || c == '`')
        .replace("\"\"", "\"")
        .replace("``", "`")
}

impl MockDatabase {
    fn apply(&mut self, sql: &str, param_count: usize) {
        let words: Vec<&str> = sql.split_whitespace().collect();
        match words.as_slice() {
            ["CREATE", "TABLE", name, ..] => {
                self.tables.insert(unquote(name));
            }
            ["DROP", "TABLE", "IF", "EXISTS", name, ..] => {
                self.tables.remove(&unquote(name));
            }
            _ => {}
        }
        self.statements.push((sql.to_string(), param_count));
    }
}

/// 可计数的外部数据源驱动
///
/// 记录建池次数、关闭次数和建池时使用的密码，可注入建池延迟、
/// 建池失败以及存活探测失败。
#[derive(Clone, Default)]
pub struct MockDataStoreDriver {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    secrets: Arc<Mutex<Vec<String>>>,
    database: Arc<Mutex<MockDatabase>>,
    delay: Option<Duration>,
    fail_open: bool,
    fail_ping: bool,
}

impl MockDataStoreDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 建池总是失败
    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_ping_failure(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    /// 预置一张已存在的表
    pub fn with_table(self, table: &str) -> Self {
        self.database.lock().unwrap().tables.insert(table.to_string());
        self
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// 每次建池使用的明文密码
    pub fn secrets(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.database.lock().unwrap().tables.contains(table)
    }

    /// 执行过的语句及其参数个数
    pub fn statements(&self) -> Vec<(String, usize)> {
        self.database.lock().unwrap().statements.clone()
    }
}

#[async_trait]
impl DataStoreDriver for MockDataStoreDriver {
    async fn open(
        &self,
        spec: &hub_core::models::ConnectionSpec,
        _options: &DataStorePoolOptions,
    ) -> HubResult<Arc<dyn DataStorePool>> {
        let dialect = spec.dialect()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.secrets.lock().unwrap().push(spec.password().to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open {
            return Err(HubError::connectivity(format!("{}: connection refused", spec.label)));
        }

        Ok(Arc::new(MockDataStorePool {
            dialect,
            database: self.database.clone(),
            closed: self.closed.clone(),
            fail_ping: self.fail_ping,
        }))
    }
}

pub struct MockDataStorePool {
    dialect: Dialect,
    database: Arc<Mutex<MockDatabase>>,
    closed: Arc<AtomicUsize>,
    fail_ping: bool,
}

#[async_trait]
impl DataStorePool for MockDataStorePool {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn ping(&self) -> HubResult<()> {
        if self.fail_ping {
            Err(HubError::connectivity("ping failed"))
        } else {
            Ok(())
        }
    }

    async fn databases(&self) -> HubResult<Vec<String>> {
        Ok(vec!["analytics".to_string()])
    }

    async fn tables(&self, _database: &str) -> HubResult<Vec<QueryColumn>> {
        let mut tables: Vec<QueryColumn> = self
            .database
            .lock()
            .unwrap()
            .tables
            .iter()
            .map(|t| QueryColumn::new(t.clone(), "TABLE"))
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn columns(&self, _database: &str, table: &str) -> HubResult<TableInfo> {
        Ok(TableInfo {
            table_name: table.to_string(),
            primary_keys: vec!["id".to_string()],
            columns: vec![QueryColumn::new("id", "INTEGER"), QueryColumn::new("name", "TEXT")],
        })
    }

    async fn table_exists(&self, table: &str) -> HubResult<bool> {
        Ok(self.database.lock().unwrap().tables.contains(table))
    }

    async fn execute(&self, sql: &str, params: &[Option<String>]) -> HubResult<u64> {
        self.database.lock().unwrap().apply(sql, params.len());
        Ok(1)
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 记录调用的触发器调度
#[derive(Default)]
pub struct MockTriggerScheduler {
    jobs: Mutex<BTreeMap<i64, CronJob>>,
    fail_add: Mutex<HashSet<i64>>,
    fail_remove: Mutex<HashSet<i64>>,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

impl MockTriggerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册该任务时返回调度错误
    pub fn failing_for(self, job_id: i64) -> Self {
        self.fail_add.lock().unwrap().insert(job_id);
        self
    }

    pub fn fail_add(&self, job_id: i64) {
        self.fail_add.lock().unwrap().insert(job_id);
    }

    pub fn fail_remove(&self, job_id: i64) {
        self.fail_remove.lock().unwrap().insert(job_id);
    }

    pub fn add_count(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn registered(&self, job_id: i64) -> Option<CronJob> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }
}

#[async_trait]
impl TriggerScheduler for MockTriggerScheduler {
    async fn add_job(&self, job: &CronJob) -> HubResult<()> {
        if self.fail_add.lock().unwrap().contains(&job.id) {
            return Err(HubError::scheduling(format!("trigger rejected for job {}", job.id)));
        }
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn modify_job(&self, job: &CronJob) -> HubResult<()> {
        self.remove_job(job.id).await?;
        self.add_job(job).await
    }

    async fn remove_job(&self, job_id: i64) -> HubResult<()> {
        if self.fail_remove.lock().unwrap().contains(&job_id) {
            return Err(HubError::scheduling(format!("trigger removal failed for job {job_id}")));
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().remove(&job_id);
        Ok(())
    }

    async fn contains(&self, job_id: i64) -> bool {
        self.jobs.lock().unwrap().contains_key(&job_id)
    }
}

/// 记录每次触发的回调
#[derive(Default)]
pub struct RecordingFireHandler {
    fired: Mutex<Vec<i64>>,
}

impl RecordingFireHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<i64> {
        self.fired.lock().unwrap().clone()
    }

    pub fn fired_count(&self, job_id: i64) -> usize {
        self.fired.lock().unwrap().iter().filter(|id| **id == job_id).count()
    }
}

impl FireHandler for RecordingFireHandler {
    fn on_fire(&self, job: &CronJob) {
        self.fired.lock().unwrap().push(job.id);
    }
}

/// 记录执行的载荷执行器
pub struct RecordingExecutor {
    job_type: JobType,
    delay: Option<Duration>,
    failing: HashSet<i64>,
    started: Mutex<Vec<i64>>,
    executed: Mutex<Vec<i64>>,
}

impl RecordingExecutor {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            delay: None,
            failing: HashSet::new(),
            started: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 该任务执行完成后返回错误
    pub fn failing_for(mut self, job_id: i64) -> Self {
        self.failing.insert(job_id);
        self
    }

    pub fn started(&self) -> Vec<i64> {
        self.started.lock().unwrap().clone()
    }

    /// 跑完载荷的任务（包括返回错误的）
    pub fn executed(&self) -> Vec<i64> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobPayloadExecutor for RecordingExecutor {
    fn job_type(&self) -> JobType {
        self.job_type.clone()
    }

    async fn execute(&self, job: &CronJob) -> HubResult<()> {
        self.started.lock().unwrap().push(job.id);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.lock().unwrap().push(job.id);

        if self.failing.contains(&job.id) {
            return Err(HubError::internal(format!("payload failed for job {}", job.id)));
        }
        Ok(())
    }
}

/// 固定结果的权限门
#[derive(Debug, Clone)]
pub struct StaticPermissionGate {
    granted: Vec<Permission>,
}

impl StaticPermissionGate {
    pub fn allow_all() -> Self {
        Self {
            granted: vec![Permission::Read, Permission::ReadConfig, Permission::Write],
        }
    }

    pub fn deny_all() -> Self {
        Self { granted: Vec::new() }
    }

    /// 只能查看，看不到连接配置
    pub fn read_only() -> Self {
        Self {
            granted: vec![Permission::Read],
        }
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn check(
        &self,
        _actor: &Actor,
        _kind: EntityKind,
        _project_id: i64,
        _entity_id: Option<i64>,
        permission: Permission,
    ) -> bool {
        self.granted.contains(&permission)
    }
}

/// 可手动设置的时钟
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
