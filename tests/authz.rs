use futures_util::StreamExt;
use pathguard::artifact::ExecutionArtifact;
use pathguard::authz::{AccessError, AuthorizationError, AuthorizationManager};
use pathguard::cache::CacheManager;
use pathguard::config::EngineSettings;
use pathguard::context::{self, ContextHandle, ExecutionContext};
use pathguard::delegator::{InMemoryDelegator, UserLogin};
use pathguard::directive::render_secured;
use pathguard::dispatch::{FnDispatcher, ServiceError, permission_result};
use pathguard::permission::{Permission, PermissionAtom};
use serde_json::{Value, json};
use std::sync::Arc;

fn atom(atom: PermissionAtom) -> Permission {
    Permission::atom(atom)
}

fn world(
    delegator: &Arc<InMemoryDelegator>,
    dispatcher: FnDispatcher,
) -> (Arc<AuthorizationManager>, ContextHandle) {
    world_with_settings(delegator, dispatcher, EngineSettings::default())
}

fn world_with_settings(
    delegator: &Arc<InMemoryDelegator>,
    dispatcher: FnDispatcher,
    settings: EngineSettings,
) -> (Arc<AuthorizationManager>, ContextHandle) {
    let dispatcher = Arc::new(dispatcher);
    let caches = CacheManager::new(settings);
    let security = Arc::new(AuthorizationManager::new(
        delegator.clone(),
        dispatcher.clone(),
        &caches,
    ));
    let handle = ExecutionContext::builder()
        .user_login(UserLogin::new("alice"))
        .delegator(delegator.clone())
        .dispatcher(dispatcher)
        .security(security.clone())
        .build_handle();
    (security, handle)
}

#[tokio::test]
async fn grants_hold_at_the_exact_path_only() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main").with_user_grant("alice", "/module/view", "VIEW=true"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _module = ctx.enter(ExecutionArtifact::screen("module"));
        let _view = ctx.enter(ExecutionArtifact::screen("view"));

        let controller = security.access_controller().await.unwrap();
        controller.check_permission(&atom(PermissionAtom::View)).await.unwrap();
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Update)).await,
            Err(AccessError::Denied { .. })
        ));
    })
    .await;
}

#[tokio::test]
async fn wildcard_grants_cover_the_subtree_but_not_the_root() {
    let delegator =
        Arc::new(InMemoryDelegator::new("main").with_user_grant("alice", "/module/*", "READ=true"));
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let controller = security.access_controller().await.unwrap();
        {
            let _module = ctx.enter(ExecutionArtifact::screen("module"));
            let _x = ctx.enter(ExecutionArtifact::screen("x"));
            let _y = ctx.enter(ExecutionArtifact::screen("y"));
            controller.check_permission(&atom(PermissionAtom::Read)).await.unwrap();
        }
        assert_eq!(ctx.stack_depth(), 0);
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Read)).await,
            Err(AccessError::Denied { .. })
        ));
    })
    .await;
}

#[tokio::test]
async fn user_exclude_overrides_group_grant() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_membership("alice", "g")
            .with_group_grant("g", "/module/*", "DELETE=true")
            .with_user_grant("alice", "/module/secret", "DELETE=false"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let controller = security.access_controller().await.unwrap();
        {
            let _module = ctx.enter(ExecutionArtifact::screen("module"));
            let _secret = ctx.enter(ExecutionArtifact::screen("secret"));
            assert!(matches!(
                controller.check_permission(&atom(PermissionAtom::Delete)).await,
                Err(AccessError::Denied { .. })
            ));
        }
        {
            let _module = ctx.enter(ExecutionArtifact::screen("module"));
            let _other = ctx.enter(ExecutionArtifact::screen("other"));
            controller.check_permission(&atom(PermissionAtom::Delete)).await.unwrap();
        }
    })
    .await;
}

#[tokio::test]
async fn a_false_service_verdict_denies_despite_atoms() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_user_grant("alice", "/x", "READ=true")
            .with_user_grant("alice", "/x", "service=chkQuota"),
    );
    let dispatcher =
        FnDispatcher::new().with_service("chkQuota", |_params| Ok(permission_result(false)));
    let (security, handle) = world(&delegator, dispatcher);
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _x = ctx.enter(ExecutionArtifact::screen("x"));
        let controller = security.access_controller().await.unwrap();
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Read)).await,
            Err(AccessError::Denied { .. })
        ));
    })
    .await;
}

#[tokio::test]
async fn a_failing_service_carries_no_opinion() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_user_grant("alice", "/x", "READ=true")
            .with_user_grant("alice", "/x", "service=flaky"),
    );
    let dispatcher = FnDispatcher::new().with_service("flaky", |_params| {
        Err(ServiceError::Failed {
            service: "flaky".into(),
            message: "backend down".into(),
        })
    });
    let (security, handle) = world(&delegator, dispatcher);
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _x = ctx.enter(ExecutionArtifact::screen("x"));
        let controller = security.access_controller().await.unwrap();
        controller.check_permission(&atom(PermissionAtom::Read)).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn bypass_short_circuits_every_check() {
    let delegator = Arc::new(InMemoryDelegator::new("main"));
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let controller = security.access_controller().await.unwrap();

        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Admin)).await,
            Err(AccessError::Denied { .. })
        ));
        {
            let _bypass = ctx.run_unprotected();
            controller.check_permission(&atom(PermissionAtom::Admin)).await.unwrap();
        }
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Admin)).await,
            Err(AccessError::Denied { .. })
        ));
    })
    .await;
}

#[tokio::test]
async fn disabled_authorization_grants_everything() {
    let delegator = Arc::new(InMemoryDelegator::new("main"));
    let settings = EngineSettings {
        authorization_disabled: true,
        ..EngineSettings::default()
    };
    let (security, handle) = world_with_settings(&delegator, FnDispatcher::new(), settings);
    context::scope(handle, async move {
        let controller = security.access_controller().await.unwrap();
        controller.check_permission(&atom(PermissionAtom::Admin)).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn controllers_are_memoized_until_user_data_clears() {
    let delegator = Arc::new(InMemoryDelegator::new("main"));
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _view = ctx.enter(ExecutionArtifact::screen("view"));

        let controller = security.access_controller().await.unwrap();
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::View)).await,
            Err(AccessError::Denied { .. })
        ));

        // New grant lands, but the memoized tree still answers.
        delegator.add_user_grant("alice", "/view", "VIEW=true");
        let cached = security.access_controller().await.unwrap();
        assert!(matches!(
            cached.check_permission(&atom(PermissionAtom::View)).await,
            Err(AccessError::Denied { .. })
        ));

        security.clear_user_data("alice");
        let rebuilt = security.access_controller().await.unwrap();
        rebuilt.check_permission(&atom(PermissionAtom::View)).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn group_closure_follows_parents_through_diamonds() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_membership("alice", "g1")
            .with_group_parent("g1", "g2")
            .with_group_parent("g1", "g3")
            .with_group_parent("g2", "g4")
            .with_group_parent("g3", "g4")
            .with_group_grant("g4", "/deep", "VIEW=true"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _deep = ctx.enter(ExecutionArtifact::screen("deep"));
        let controller = security.access_controller().await.unwrap();
        controller.check_permission(&atom(PermissionAtom::View)).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn denials_at_audited_artifacts_are_recorded() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_audited("/module/*")
            .with_user_grant("alice", "/elsewhere", "VIEW=true"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async {
        let ctx = context::current().unwrap();
        let _module = ctx.enter(ExecutionArtifact::screen("module"));
        let _secret = ctx.enter(ExecutionArtifact::screen("secret"));
        let controller = security.access_controller().await.unwrap();
        assert!(matches!(
            controller.check_permission(&atom(PermissionAtom::Delete)).await,
            Err(AccessError::Denied { .. })
        ));
    })
    .await;

    let incidents = delegator.incidents();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].user_login_id, "alice");
    assert_eq!(incidents[0].artifact_path, "/module/secret");
    assert_eq!(incidents[0].requested_access, "DELETE");
}

#[tokio::test]
async fn denials_outside_audited_patterns_are_not_recorded() {
    let delegator = Arc::new(InMemoryDelegator::new("main").with_audited("/module/*"));
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async {
        let ctx = context::current().unwrap();
        let _other = ctx.enter(ExecutionArtifact::screen("other"));
        let controller = security.access_controller().await.unwrap();
        assert!(
            controller
                .check_permission(&atom(PermissionAtom::Delete))
                .await
                .is_err()
        );
    })
    .await;

    assert!(delegator.incidents().is_empty());
}

#[tokio::test]
async fn missing_user_fails_the_controller_lookup() {
    let delegator = Arc::new(InMemoryDelegator::new("main"));
    let dispatcher = Arc::new(FnDispatcher::new());
    let caches = CacheManager::new(EngineSettings::default());
    let security = Arc::new(AuthorizationManager::new(
        delegator,
        dispatcher,
        &caches,
    ));
    let handle = ExecutionContext::builder().build_handle();
    context::scope(handle, async move {
        assert!(matches!(
            security.access_controller().await,
            Err(AuthorizationError::MissingUser)
        ));
    })
    .await;
}

#[tokio::test]
async fn malformed_grants_abort_the_build() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main").with_user_grant("alice", "/x", "FLY=true"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        assert!(matches!(
            security.access_controller().await,
            Err(AuthorizationError::InvalidPermission(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn row_filters_drop_vetoed_rows() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_user_grant("alice", "/x", "READ=true")
            .with_user_grant("alice", "/x", "filter=rowFilter"),
    );
    let dispatcher = FnDispatcher::new().with_service("rowFilter", |params| {
        let allowed = params
            .get("candidate")
            .and_then(|row| row.get("ok"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(permission_result(allowed))
    });
    let (security, handle) = world(&delegator, dispatcher);
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _x = ctx.enter(ExecutionArtifact::screen("x"));
        let controller = security.access_controller().await.unwrap();

        let rows = vec![
            json!({"id": 1, "ok": true}),
            json!({"id": 2, "ok": false}),
            json!({"id": 3, "ok": true}),
        ];
        let kept = controller.filtered_rows(rows.clone()).await.unwrap();
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|row| row["ok"] == json!(true)));

        let streamed: Vec<Value> = controller
            .filtered_stream(futures_util::stream::iter(rows))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(streamed.len(), 2);
    })
    .await;
}

#[tokio::test]
async fn rows_pass_untouched_without_filters() {
    let delegator =
        Arc::new(InMemoryDelegator::new("main").with_user_grant("alice", "/x", "READ=true"));
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _x = ctx.enter(ExecutionArtifact::screen("x"));
        let controller = security.access_controller().await.unwrap();
        let rows = vec![json!({"id": 1}), json!({"id": 2})];
        let kept = controller.filtered_rows(rows.clone()).await.unwrap();
        assert_eq!(kept, rows);
    })
    .await;
}

#[tokio::test]
async fn secured_rendering_shows_body_only_when_granted() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main").with_user_grant("alice", "/widget", "VIEW=true"),
    );
    let (_, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async {
        let ctx = context::current().unwrap();

        let rendered = render_secured("widget", &atom(PermissionAtom::View), || async {
            "<b>body</b>".to_owned()
        })
        .await
        .unwrap();
        assert_eq!(rendered, "<b>body</b>");
        assert_eq!(ctx.stack_depth(), 0);

        let hidden = render_secured("widget", &atom(PermissionAtom::Delete), || async {
            "<b>body</b>".to_owned()
        })
        .await
        .unwrap();
        assert_eq!(hidden, "");
        assert_eq!(ctx.stack_depth(), 0);
    })
    .await;
}

#[tokio::test]
async fn composite_requests_resolve_against_the_tree() {
    let delegator = Arc::new(
        InMemoryDelegator::new("main")
            .with_user_grant("alice", "/x", "READ=true")
            .with_user_grant("alice", "/x", "VIEW=true"),
    );
    let (security, handle) = world(&delegator, FnDispatcher::new());
    context::scope(handle, async move {
        let ctx = context::current().unwrap();
        let _x = ctx.enter(ExecutionArtifact::screen("x"));
        let controller = security.access_controller().await.unwrap();

        let read_and_see = Permission::intersection(
            "read-and-see",
            vec![
                atom(PermissionAtom::Read),
                Permission::union(
                    "see",
                    vec![atom(PermissionAtom::View), atom(PermissionAtom::Admin)],
                ),
            ],
        );
        controller.check_permission(&read_and_see).await.unwrap();

        let need_admin = Permission::intersection(
            "need-admin",
            vec![atom(PermissionAtom::Read), atom(PermissionAtom::Admin)],
        );
        assert!(controller.check_permission(&need_admin).await.is_err());
    })
    .await;
}
