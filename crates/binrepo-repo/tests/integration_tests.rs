//! Integration tests for the repository engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tokio::sync::mpsc::UnboundedReceiver;

use binrepo_core::{
    ItemInfo, LocalRepoDescriptor, MultiStatusHolder, PackageType, Properties,
    RemoteRepoDescriptor, RepoPath, RepoPolicy, RepositoriesConfig, StatusHolder, StatusReporter,
    VirtualRepoDescriptor, codes,
};
use binrepo_repo::interceptors::{
    MetadataCalculator, MetadataInterceptor, MetadataRecalculator, NupkgFormat,
    PackageMetadataInterceptor, PackageMetadataStore, UserHookInterceptor,
    latest_version_channel, LatestVersionRequest, LatestVersionWorker,
};
use binrepo_repo::{
    BeforeCreate, CancelSignal, HookContext, HookResult, Interceptor, InterceptorRegistry,
    ItemStore, LockMode, MemoryItemStore, MutationKind, MutationRequest, RepoError,
    RepositoryService, Stage, VirtualRepoResolver,
};

/// `libs` = [releases-local, releases-cache, libs-snapshot-local]
fn libs_config() -> RepositoriesConfig {
    let mut config = RepositoriesConfig::default();
    config
        .add_local(LocalRepoDescriptor::new("releases-local"))
        .add_local(LocalRepoDescriptor::new("libs-snapshot-local"))
        .add_remote(RemoteRepoDescriptor::new(
            "releases",
            "https://repo.example.org/releases",
        ))
        .add_virtual(VirtualRepoDescriptor::new(
            "libs",
            ["releases-local", "releases-cache", "libs-snapshot-local"],
        ));
    config
}

fn seed(service: &RepositoryService, repo: &str, path: &str) {
    service
        .store()
        .create(ItemInfo::file(RepoPath::new(repo, path), 1))
        .unwrap();
}

mod resolution {
    use super::*;

    const ARTIFACT: &str = "com/acme/app/1.0/app.jar";

    #[test]
    fn test_first_repository_in_order_wins() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        let path = RepoPath::new("libs", ARTIFACT);
        let mut status = StatusHolder::new();

        assert!(matches!(
            service.resolve(&path, &mut status),
            Err(RepoError::ItemNotFound { .. })
        ));

        seed(&service, "libs-snapshot-local", ARTIFACT);
        assert_eq!(
            service.resolve(&path, &mut status).unwrap().repo_key,
            "libs-snapshot-local"
        );

        seed(&service, "releases-cache", ARTIFACT);
        assert_eq!(
            service.resolve(&path, &mut status).unwrap().repo_key,
            "releases-cache"
        );

        seed(&service, "releases-local", ARTIFACT);
        assert_eq!(
            service.resolve(&path, &mut status).unwrap().repo_key,
            "releases-local"
        );
    }

    #[test]
    fn test_remote_key_reads_from_cache() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        seed(&service, "releases-cache", ARTIFACT);

        let resolved = service
            .resolve(&RepoPath::new("releases", ARTIFACT), &mut StatusHolder::new())
            .unwrap();
        assert_eq!(resolved.repo_key, "releases-cache");
        assert_eq!(resolved.path(), &RepoPath::new("releases-cache", ARTIFACT));
    }

    #[test]
    fn test_order_preserved_after_reload() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        let mut status = MultiStatusHolder::new();
        let keys = |service: &RepositoryService, status: &mut MultiStatusHolder| {
            let graph = service.graph().snapshot();
            VirtualRepoResolver::new(&graph)
                .resolve_key("libs", status)
                .unwrap()
                .keys()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            keys(&service, &mut status),
            ["releases-local", "releases-cache", "libs-snapshot-local"]
        );

        let mut reordered = libs_config();
        reordered.virtual_repositories[0].repositories = vec![
            "libs-snapshot-local".to_string(),
            "releases-local".to_string(),
        ];
        service.reload_configuration(reordered).unwrap();

        assert_eq!(
            keys(&service, &mut status),
            ["libs-snapshot-local", "releases-local"]
        );
    }

    #[test]
    fn test_virtual_listing_merges_members() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        seed(&service, "releases-local", "com/acme/app/1.0/app.jar");
        seed(&service, "libs-snapshot-local", "com/acme/app/1.1-SNAPSHOT/app.jar");
        seed(&service, "libs-snapshot-local", "com/acme/app/1.0/app.jar");

        let children = service
            .children(&RepoPath::new("libs", "com/acme/app"), &mut StatusHolder::new())
            .unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["1.0", "1.1-SNAPSHOT"]);
        assert_eq!(children[0].repo_keys, ["releases-local", "libs-snapshot-local"]);
    }
}

mod cycle_safety {
    use super::*;

    #[test]
    fn test_mutual_recursion_terminates_with_each_repo_once() {
        let mut config = RepositoriesConfig::default();
        config
            .add_local(LocalRepoDescriptor::new("a-local"))
            .add_local(LocalRepoDescriptor::new("b-local"))
            .add_local(LocalRepoDescriptor::new("c-local"))
            .add_virtual(VirtualRepoDescriptor::new("x", ["a-local", "y", "b-local"]))
            .add_virtual(VirtualRepoDescriptor::new("y", ["b-local", "z"]))
            .add_virtual(VirtualRepoDescriptor::new("z", ["x", "c-local", "z"]));
        let service = RepositoryService::builder(config).unwrap().build();
        let graph = service.graph().snapshot();
        let resolver = VirtualRepoResolver::new(&graph);

        for key in ["x", "y", "z"] {
            let mut status = MultiStatusHolder::new();
            let resolved = resolver.resolve_key(key, &mut status).unwrap();
            let mut keys = resolved.keys();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), total, "duplicates in {}", key);
            assert_eq!(total, 3);
            assert!(status.has_warnings());
            assert!(!status.is_error());
        }
    }
}

mod locking {
    use super::*;

    #[test]
    fn test_concurrent_writers_on_same_path_are_exclusive() {
        let service = Arc::new(RepositoryService::builder(libs_config()).unwrap().build());
        let path = RepoPath::new("releases-local", "com/acme/app.jar");
        let barrier = Arc::new(Barrier::new(8));
        let granted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                let granted = Arc::clone(&granted);
                thread::spawn(move || {
                    barrier.wait();
                    let uow = service.acquire_unit_of_work(&[path]);
                    if uow.is_ok() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                    // Hold the lock until every thread has tried
                    barrier.wait();
                    uow.map(drop)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(granted.load(Ordering::SeqCst), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(RepoError::is_retryable)
        );
        assert_eq!(service.locks().locked_path_count(), 0);
    }

    #[test]
    fn test_writers_on_different_paths_do_not_block() {
        let service = Arc::new(RepositoryService::builder(libs_config()).unwrap().build());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let path = RepoPath::new("releases-local", format!("app-{}.jar", i));
                    let uow = service.acquire_unit_of_work(&[path])?;
                    barrier.wait();
                    drop(uow);
                    Ok::<_, RepoError>(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn test_unit_of_work_releases_everything_on_partial_failure() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        let b = RepoPath::new("releases-local", "b.jar");
        let _other = service.acquire_unit_of_work(&[b.clone()]).unwrap();

        let err = service
            .acquire_unit_of_work(&[RepoPath::new("releases-local", "a.jar"), b])
            .unwrap_err();
        assert!(err.is_retryable());
        // Only the other session's lock remains
        assert_eq!(service.locks().locked_path_count(), 1);
    }

    #[test]
    fn test_read_conflicts_with_pending_write() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        seed(&service, "releases-local", "com/acme/app.jar");
        let local = RepoPath::new("releases-local", "com/acme/app.jar");
        let held = service.acquire_unit_of_work(&[local.clone()]).unwrap();

        let mut status = StatusHolder::new();
        let err = service.resolve(&local, &mut status).unwrap_err();
        assert!(matches!(err, RepoError::Locked { .. }));
        assert_eq!(status.status_code(), codes::LOCKED);

        // Through a virtual, the member holding the write is contended too
        let err = service
            .resolve(&RepoPath::new("libs", "com/acme/app.jar"), &mut StatusHolder::new())
            .unwrap_err();
        assert!(err.is_retryable());

        // Other paths stay readable
        assert!(matches!(
            service.resolve(&RepoPath::new("releases-local", "other.jar"), &mut StatusHolder::new()),
            Err(RepoError::ItemNotFound { .. })
        ));

        drop(held);
        let resolved = service.resolve(&local, &mut StatusHolder::new()).unwrap();
        assert_eq!(resolved.repo_key, "releases-local");
        assert_eq!(service.locks().locked_path_count(), 0);
    }

    #[test]
    fn test_move_locks_source_and_target() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        let from = RepoPath::new("releases-local", "a.jar");
        let to = RepoPath::new("libs-snapshot-local", "a.jar");
        let uow = service.acquire_unit_of_work(&[to.clone(), from.clone()]).unwrap();

        assert!(uow.holds(&from, LockMode::Write));
        assert!(uow.holds(&to, LockMode::Write));
        assert_eq!(uow.locked_paths().len(), 2);
    }
}

mod deploy_policy {
    use super::*;

    const SNAPSHOT_JAR: &str = "com/acme/app/1.0-SNAPSHOT/app-1.0-SNAPSHOT.jar";

    fn snapshot_only_config() -> RepositoriesConfig {
        let mut config = RepositoriesConfig::default();
        config
            .add_local(LocalRepoDescriptor::new("releases-local"))
            .add_local(LocalRepoDescriptor::new("libs-snapshot-local").with_policy(RepoPolicy {
                handle_releases: false,
                ..RepoPolicy::default()
            }));
        config
    }

    fn deploy_snapshot(service: &RepositoryService) {
        service
            .create(
                &RepoPath::new("libs-snapshot-local", SNAPSHOT_JAR),
                1,
                Properties::new(),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();
    }

    #[test]
    fn test_parent_folder_of_snapshot_can_be_deleted() {
        let service = RepositoryService::builder(snapshot_only_config()).unwrap().build();
        deploy_snapshot(&service);

        let deleted = service
            .delete(
                &RepoPath::new("libs-snapshot-local", "com/acme/app"),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();
        assert!(deleted.is_folder());
        assert!(!service
            .store()
            .exists(&RepoPath::new("libs-snapshot-local", SNAPSHOT_JAR)));
        assert_eq!(service.locks().locked_path_count(), 0);
    }

    #[test]
    fn test_releases_are_still_refused_on_create() {
        let service = RepositoryService::builder(snapshot_only_config()).unwrap().build();
        let err = service
            .create(
                &RepoPath::new("libs-snapshot-local", "com/acme/app/1.0/app-1.0.jar"),
                1,
                Properties::new(),
                &mut StatusHolder::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::NotDeployable { .. }));
    }

    #[test]
    fn test_move_checks_policy_on_destination_only() {
        let service = RepositoryService::builder(snapshot_only_config()).unwrap().build();
        deploy_snapshot(&service);
        let mut status = StatusHolder::fail_fast();

        // A release-named folder in the snapshot-only repository can leave it
        let moved = service
            .move_item(
                &RepoPath::new("libs-snapshot-local", "com/acme"),
                &RepoPath::new("releases-local", "com/acme"),
                &mut status,
            )
            .unwrap();
        assert_eq!(moved.repo_key(), "releases-local");
        assert!(service
            .store()
            .exists(&RepoPath::new("releases-local", SNAPSHOT_JAR)));

        // but cannot come back under a release name
        let err = service
            .move_item(
                &RepoPath::new("releases-local", "com/acme"),
                &RepoPath::new("libs-snapshot-local", "com/acme"),
                &mut StatusHolder::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::NotDeployable { .. }));
    }

    #[test]
    fn test_virtual_paths_cannot_be_deleted() {
        let service = RepositoryService::builder(libs_config()).unwrap().build();
        seed(&service, "releases-local", "a.jar");
        assert!(matches!(
            service.delete(&RepoPath::new("libs", "a.jar"), &mut StatusHolder::new()),
            Err(RepoError::NotDeployable { .. })
        ));
    }
}

/// Vetoes every create under a configured prefix
struct PrefixGuard {
    prefix: &'static str,
}

impl BeforeCreate for PrefixGuard {
    fn before_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
        if ctx.item().repo_path.path().starts_with(self.prefix) {
            return Err(CancelSignal::new(format!("{} is reserved", self.prefix))
                .with_code(codes::FORBIDDEN)
                .into());
        }
        Ok(())
    }
}

impl Interceptor for PrefixGuard {
    fn name(&self) -> &str {
        "prefix-guard"
    }

    fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
        registry.before_create(self);
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn test_veto_skips_physical_and_after_hooks() {
        let after_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&after_calls);
        let observer = UserHookInterceptor::new().on(
            Stage::after(MutationKind::Create),
            "observer",
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        let store = Arc::new(MemoryItemStore::new());
        let service = RepositoryService::builder(libs_config())
            .unwrap()
            .store(store.clone())
            .register_interceptor(Arc::new(PrefixGuard { prefix: "internal" }))
            .register_interceptor(Arc::new(observer))
            .build();

        let mut status = MultiStatusHolder::new();
        let err = service
            .create(
                &RepoPath::new("releases-local", "internal/secret.jar"),
                1,
                Properties::new(),
                &mut status,
            )
            .unwrap_err();

        match err {
            RepoError::Cancelled { code, message } => {
                assert_eq!(code, codes::FORBIDDEN);
                assert_eq!(message, "Create rejected: internal is reserved");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.operation_counts().creates, 0);
        assert_eq!(status.errors().count(), 1);
        assert_eq!(service.locks().locked_path_count(), 0);

        service
            .create(
                &RepoPath::new("releases-local", "public/app.jar"),
                1,
                Properties::new(),
                &mut status,
            )
            .unwrap();
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_does_not_affect_other_operations() {
        let service = Arc::new(
            RepositoryService::builder(libs_config())
                .unwrap()
                .register_interceptor(Arc::new(PrefixGuard { prefix: "blocked" }))
                .build(),
        );

        let handles: Vec<_> = ["blocked/a.jar", "ok/b.jar"]
            .into_iter()
            .map(|path| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    service.create(
                        &RepoPath::new("releases-local", path),
                        1,
                        Properties::new(),
                        &mut StatusHolder::new(),
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(matches!(results[0], Err(RepoError::Cancelled { .. })));
        assert!(results[1].is_ok());
    }
}

mod status_modes {
    use super::*;

    /// Reports a problem through the status holder without vetoing
    struct Complainer(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl BeforeCreate for Complainer {
        fn before_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
            self.1.lock().unwrap().push(self.0);
            ctx.status()
                .set_error(&format!("{} objects", self.0), codes::BAD_REQUEST, None)?;
            Ok(())
        }
    }

    impl Interceptor for Complainer {
        fn name(&self) -> &str {
            self.0
        }

        fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
            registry.before_create(self);
        }
    }

    fn service(calls: &Arc<Mutex<Vec<&'static str>>>) -> RepositoryService {
        RepositoryService::builder(libs_config())
            .unwrap()
            .register_interceptor(Arc::new(Complainer("first", Arc::clone(calls))))
            .register_interceptor(Arc::new(Complainer("second", Arc::clone(calls))))
            .build()
    }

    #[test]
    fn test_fail_fast_raises_at_first_problem() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let service = service(&calls);
        let mut status = StatusHolder::fail_fast();

        let err = service
            .create(
                &RepoPath::new("releases-local", "a.jar"),
                1,
                Properties::new(),
                &mut status,
            )
            .unwrap_err();

        assert!(matches!(err, RepoError::Status(_)));
        assert_eq!(*calls.lock().unwrap(), ["first"]);
        assert!(!service.store().exists(&RepoPath::new("releases-local", "a.jar")));
        assert_eq!(service.locks().locked_path_count(), 0);
    }

    #[test]
    fn test_accumulate_collects_every_problem() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let service = service(&calls);
        let mut status = MultiStatusHolder::new();

        service
            .create(
                &RepoPath::new("releases-local", "a.jar"),
                1,
                Properties::new(),
                &mut status,
            )
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["first", "second"]);
        let messages: Vec<_> = status.errors().map(|e| e.message()).collect();
        assert_eq!(messages, ["first objects", "second objects"]);
        assert!(status.is_error());
    }
}

mod metadata {
    use super::*;

    #[derive(Default)]
    struct CountingRecalculator {
        folders: Mutex<Vec<RepoPath>>,
    }

    impl MetadataRecalculator for CountingRecalculator {
        fn recalculate(&self, folder: &RepoPath) -> binrepo_repo::Result<()> {
            self.folders.lock().unwrap().push(folder.clone());
            Ok(())
        }
    }

    #[test]
    fn test_ten_sibling_deletes_recalculate_once() {
        let recalculator = Arc::new(CountingRecalculator::default());
        let calculator = Arc::new(MetadataCalculator::new(recalculator.clone()));
        let builder = RepositoryService::builder(libs_config()).unwrap();
        let interceptor = MetadataInterceptor::new(builder.graph(), Arc::clone(&calculator));
        let service = builder
            .register_interceptor(Arc::new(interceptor))
            .save_hook(calculator.clone())
            .build();

        let folder = RepoPath::new("releases-local", "com/acme/app/1.0");
        let poms: Vec<RepoPath> = (0..10)
            .map(|i| folder.child(&format!("app-1.0-{}.pom", i)))
            .collect();
        for pom in &poms {
            service
                .store()
                .create(ItemInfo::file(pom.clone(), 1))
                .unwrap();
        }

        let mut status = MultiStatusHolder::new();
        let uow = service.acquire_unit_of_work(&poms).unwrap();
        for pom in &poms {
            let item = service.store().item(pom).unwrap();
            service
                .mutate_in(&uow, &MutationRequest::delete(&item), &mut status, || {
                    service.store().delete(pom).map(|_| ())
                })
                .unwrap();
        }
        assert!(uow.has_pending_changes());
        assert!(recalculator.folders.lock().unwrap().is_empty());

        uow.commit().unwrap();
        assert_eq!(*recalculator.folders.lock().unwrap(), vec![folder]);
        assert!(!status.is_error());
    }

    #[test]
    fn test_discarded_unit_of_work_drops_queue() {
        let recalculator = Arc::new(CountingRecalculator::default());
        let calculator = Arc::new(MetadataCalculator::new(recalculator.clone()));
        let builder = RepositoryService::builder(libs_config()).unwrap();
        let interceptor = MetadataInterceptor::new(builder.graph(), Arc::clone(&calculator));
        let service = builder
            .register_interceptor(Arc::new(interceptor))
            .save_hook(calculator.clone())
            .build();

        let pom = RepoPath::new("releases-local", "com/acme/app/1.0/app-1.0.pom");
        seed(&service, "releases-local", pom.path());

        let uow = service.acquire_unit_of_work(&[pom.clone()]).unwrap();
        let item = service.store().item(&pom).unwrap();
        service
            .mutate_in(&uow, &MutationRequest::delete(&item), &mut StatusHolder::new(), || {
                service.store().delete(&pom).map(|_| ())
            })
            .unwrap();
        let session = uow.id();
        drop(uow);

        assert!(calculator.pending_folders(session).is_empty());
        assert!(recalculator.folders.lock().unwrap().is_empty());
    }

    #[test]
    fn test_create_recalculates_immediately() {
        let recalculator = Arc::new(CountingRecalculator::default());
        let calculator = Arc::new(MetadataCalculator::new(recalculator.clone()));
        let builder = RepositoryService::builder(libs_config()).unwrap();
        let interceptor = MetadataInterceptor::new(builder.graph(), Arc::clone(&calculator));
        let service = builder
            .register_interceptor(Arc::new(interceptor))
            .save_hook(calculator)
            .build();

        service
            .create(
                &RepoPath::new("releases-local", "com/acme/app/1.0/app-1.0.pom"),
                1,
                Properties::new(),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();
        service
            .create(
                &RepoPath::new("releases", "org/lib/2.0/lib-2.0.pom"),
                1,
                Properties::new(),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();

        // Caches never recalculate
        assert_eq!(
            *recalculator.folders.lock().unwrap(),
            vec![RepoPath::new("releases-local", "com/acme/app/1.0")]
        );
    }
}

mod package_metadata {
    use super::*;

    fn nuget_config() -> RepositoriesConfig {
        let policy = RepoPolicy {
            package_type: PackageType::Nuget,
            ..RepoPolicy::default()
        };
        let mut config = RepositoriesConfig::default();
        config
            .add_local(LocalRepoDescriptor::new("nuget-local").with_policy(policy.clone()))
            .add_local(LocalRepoDescriptor::new("nuget-archive").with_policy(policy));
        config
    }

    #[tokio::test]
    async fn test_latest_version_follows_mutations() {
        let store = Arc::new(PackageMetadataStore::new());
        let (tx, rx) = latest_version_channel();
        let builder = RepositoryService::builder(nuget_config()).unwrap();
        let interceptor = PackageMetadataInterceptor::new(
            builder.graph(),
            Arc::new(NupkgFormat),
            Arc::clone(&store),
            tx,
        );
        let service = builder.register_interceptor(Arc::new(interceptor)).build();
        let mut status = StatusHolder::fail_fast();

        for version in ["1.0.0", "1.2.0", "1.10.0"] {
            service
                .create(
                    &RepoPath::new("nuget-local", format!("Acme.Core.{}.nupkg", version)),
                    1,
                    Properties::new(),
                    &mut status,
                )
                .unwrap();
        }
        let worker = LatestVersionWorker::new(Arc::clone(&store));

        // Moving the latest version away makes the next one latest
        service
            .move_item(
                &RepoPath::new("nuget-local", "Acme.Core.1.10.0.nupkg"),
                &RepoPath::new("nuget-archive", "Acme.Core.1.10.0.nupkg"),
                &mut status,
            )
            .unwrap();
        drop(service);

        worker.run(rx).await;

        assert_eq!(
            store.latest("nuget-local", "Acme.Core"),
            Some(RepoPath::new("nuget-local", "Acme.Core.1.2.0.nupkg"))
        );
        assert_eq!(
            store.latest("nuget-archive", "Acme.Core"),
            Some(RepoPath::new("nuget-archive", "Acme.Core.1.10.0.nupkg"))
        );
    }

    struct NugetFixture {
        service: RepositoryService,
        store: Arc<PackageMetadataStore>,
        worker: LatestVersionWorker,
        requests: UnboundedReceiver<LatestVersionRequest>,
    }

    impl NugetFixture {
        fn new() -> Self {
            let store = Arc::new(PackageMetadataStore::new());
            let (tx, requests) = latest_version_channel();
            let builder = RepositoryService::builder(nuget_config()).unwrap();
            let interceptor = PackageMetadataInterceptor::new(
                builder.graph(),
                Arc::new(NupkgFormat),
                Arc::clone(&store),
                tx,
            );
            Self {
                service: builder.register_interceptor(Arc::new(interceptor)).build(),
                worker: LatestVersionWorker::new(Arc::clone(&store)),
                store,
                requests,
            }
        }

        fn deploy(&self, name: &str) {
            self.service
                .create(
                    &RepoPath::new("nuget-local", name),
                    1,
                    Properties::new(),
                    &mut StatusHolder::fail_fast(),
                )
                .unwrap();
        }

        /// Run every queued request; returns the distinct requests seen
        fn settle(&mut self) -> Vec<LatestVersionRequest> {
            let mut seen = Vec::new();
            while let Ok(request) = self.requests.try_recv() {
                self.worker.recompute(&request);
                if !seen.contains(&request) {
                    seen.push(request);
                }
            }
            seen
        }
    }

    fn request(repo: &str, id: &str) -> LatestVersionRequest {
        LatestVersionRequest {
            repo_key: repo.to_string(),
            package_id: id.to_string(),
        }
    }

    #[test]
    fn test_deleting_latest_recomputes() {
        let mut fixture = NugetFixture::new();
        fixture.deploy("A.1.0.0.nupkg");
        fixture.deploy("A.2.0.0.nupkg");
        fixture.settle();
        assert_eq!(
            fixture.store.latest("nuget-local", "A"),
            Some(RepoPath::new("nuget-local", "A.2.0.0.nupkg"))
        );

        fixture
            .service
            .delete(
                &RepoPath::new("nuget-local", "A.2.0.0.nupkg"),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();

        assert_eq!(fixture.settle(), vec![request("nuget-local", "A")]);
        assert_eq!(
            fixture.store.latest("nuget-local", "A"),
            Some(RepoPath::new("nuget-local", "A.1.0.0.nupkg"))
        );
    }

    #[test]
    fn test_deleting_older_version_requests_nothing() {
        let mut fixture = NugetFixture::new();
        fixture.deploy("A.1.0.0.nupkg");
        fixture.deploy("A.2.0.0.nupkg");
        fixture.settle();

        fixture
            .service
            .delete(
                &RepoPath::new("nuget-local", "A.1.0.0.nupkg"),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();

        assert!(fixture.settle().is_empty());
        assert_eq!(
            fixture.store.latest("nuget-local", "A"),
            Some(RepoPath::new("nuget-local", "A.2.0.0.nupkg"))
        );
    }

    #[test]
    fn test_moving_latest_recomputes_both_repositories() {
        let mut fixture = NugetFixture::new();
        fixture.deploy("A.1.0.0.nupkg");
        fixture.deploy("A.2.0.0.nupkg");
        fixture.settle();

        fixture
            .service
            .move_item(
                &RepoPath::new("nuget-local", "A.2.0.0.nupkg"),
                &RepoPath::new("nuget-archive", "A.2.0.0.nupkg"),
                &mut StatusHolder::fail_fast(),
            )
            .unwrap();

        assert_eq!(
            fixture.settle(),
            vec![request("nuget-local", "A"), request("nuget-archive", "A")]
        );
        assert_eq!(
            fixture.store.latest("nuget-local", "A"),
            Some(RepoPath::new("nuget-local", "A.1.0.0.nupkg"))
        );
        assert_eq!(
            fixture.store.latest("nuget-archive", "A"),
            Some(RepoPath::new("nuget-archive", "A.2.0.0.nupkg"))
        );
    }
}
