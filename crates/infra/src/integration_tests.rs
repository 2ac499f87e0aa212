//! End-to-end flow tests over the in-memory store.
//!
//! Time is driven by a `ManualClock` and deliveries are captured by a
//! `RecordingNotifier`, so every expiry boundary is exact.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    use capita_auth::{
        AccountVerification, AuthDependencies, AuthError, AuthResult, AuthServices, Identity,
        IdentityStore, LoginOutcome, NewIdentity, PasswordEncoder, RandomSecretGenerator,
        Registration, RoleStore, SecretGenerator, Session, TokenService, VerificationSettings,
        VerificationStore,
    };
    use capita_auth::roles::ROLE_USER;
    use capita_core::{Clock, ManualClock, UserId};

    use crate::notify::RecordingNotifier;
    use crate::password::BcryptPasswordEncoder;
    use crate::store::InMemoryStore;

    const PASSWORD: &str = "correct horse";

    struct Harness {
        services: AuthServices<InMemoryStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        harness_with(Arc::new(BcryptPasswordEncoder::new(4)))
    }

    fn harness_with(passwords: Arc<dyn PasswordEncoder>) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(RecordingNotifier::new());
        let tokens = Arc::new(TokenService::new(b"integration-secret", clock.clone()).unwrap());
        let deps = AuthDependencies {
            tokens,
            passwords,
            secrets: Arc::new(RandomSecretGenerator),
            notifier: notifier.clone(),
            clock: clock.clone(),
            settings: VerificationSettings::default(),
        };
        Harness {
            services: AuthServices::new(Arc::new(InMemoryStore::new()), deps),
            clock,
            notifier,
        }
    }

    fn form(email: &str, mfa_enabled: bool) -> Registration {
        Registration {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            password: PASSWORD.into(),
            phone: Some("+15550100".into()),
            mfa_enabled,
        }
    }

    async fn active_user(h: &Harness, email: &str, mfa_enabled: bool) -> Identity {
        let identity = h.services.accounts.register(form(email, mfa_enabled)).await.unwrap();
        let link = h.notifier.last_link_for(&identity.email).unwrap();
        h.services
            .verification
            .consume_account_verification_link(&link.key)
            .await
            .unwrap();
        identity
    }

    fn authenticated(outcome: LoginOutcome) -> Session {
        match outcome {
            LoginOutcome::Authenticated(session) => session,
            LoginOutcome::CodeSent(_) => panic!("expected tokens, got a code"),
        }
    }

    #[tokio::test]
    async fn login_issues_tokens_carrying_the_role_permissions() {
        let h = harness();
        active_user(&h, "ada@example.com", false).await;

        let session = authenticated(h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap());

        let verified = h.services.tokens.verify(&session.tokens.access_token).unwrap();
        assert_eq!(verified.subject, "ada@example.com");
        let authorities: Vec<String> = verified
            .authorities()
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(authorities, vec!["READ:USER", "READ:CUSTOMER"]);
        assert_eq!(session.principal.role.name, ROLE_USER);

        let refresh = h.services.tokens.verify(&session.tokens.refresh_token).unwrap();
        assert!(refresh.claims.authorities.is_none());
    }

    #[tokio::test]
    async fn login_normalizes_the_email() {
        let h = harness();
        active_user(&h, "Ada@Example.com", false).await;
        let outcome = h.services.accounts.login("  ADA@example.COM ", PASSWORD).await;
        assert!(matches!(outcome, Ok(LoginOutcome::Authenticated(_))));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let h = harness();
        active_user(&h, "ada@example.com", false).await;
        let accounts = &h.services.accounts;
        assert_eq!(
            accounts.login("ada@example.com", "wrong").await.unwrap_err(),
            AuthError::CredentialsInvalid
        );
        assert_eq!(
            accounts.login("nobody@example.com", PASSWORD).await.unwrap_err(),
            AuthError::CredentialsInvalid
        );
    }

    #[tokio::test]
    async fn locked_is_reported_before_disabled_and_before_any_code() {
        let h = harness();
        let identity = h
            .services
            .accounts
            .register(form("ada@example.com", true))
            .await
            .unwrap();
        h.services.store.set_locked(identity.id, true).await.unwrap();

        assert_eq!(
            h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap_err(),
            AuthError::AccountLocked
        );
        assert!(h.notifier.last_code_for("ada@example.com").is_none());

        h.services.store.set_locked(identity.id, false).await.unwrap();
        assert_eq!(
            h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap_err(),
            AuthError::AccountDisabled
        );
        assert!(h.notifier.last_code_for("ada@example.com").is_none());
    }

    #[tokio::test]
    async fn registration_then_account_link_is_idempotent() {
        let h = harness();
        let identity = h
            .services
            .accounts
            .register(form("ada@example.com", false))
            .await
            .unwrap();
        assert!(!identity.enabled);
        assert!(!identity.locked);

        let link = h.notifier.last_link_for("ada@example.com").unwrap();
        assert_eq!(link.url, format!("http://localhost:8080/users/verify/account/{}", link.key));
        assert!(link.expires_at.is_none());

        let verification = &h.services.verification;
        assert_eq!(
            verification.consume_account_verification_link(&link.key).await.unwrap(),
            AccountVerification::Verified
        );
        assert_eq!(
            verification.consume_account_verification_link(&link.key).await.unwrap(),
            AccountVerification::AlreadyVerified
        );
        let reloaded = h.services.store.find_by_id(identity.id).await.unwrap().unwrap();
        assert!(reloaded.enabled);

        assert_eq!(
            verification.consume_account_verification_link("no-such-key").await.unwrap_err(),
            AuthError::LinkNotFound
        );
    }

    #[tokio::test]
    async fn registration_rejects_duplicates_and_bad_input() {
        let h = harness();
        h.services
            .accounts
            .register(form("ada@example.com", false))
            .await
            .unwrap();
        assert_eq!(
            h.services
                .accounts
                .register(form("ADA@example.com", false))
                .await
                .unwrap_err(),
            AuthError::EmailAlreadyInUse
        );
        assert!(matches!(
            h.services.accounts.register(form("not-an-email", false)).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn mfa_login_sends_a_code_and_verification_issues_tokens() {
        let h = harness();
        let identity = active_user(&h, "ada@example.com", true).await;

        let outcome = h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::CodeSent(ref who) if who.id == identity.id));

        let code = h.notifier.last_code_for("ada@example.com").unwrap();
        assert_eq!(code.code.len(), 8);
        assert_eq!(code.expires_at, h.clock.now() + Duration::hours(24));

        h.clock.advance(Duration::hours(23));
        let session = h
            .services
            .accounts
            .verify_code("ada@example.com", &code.code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(session.principal.email(), "ada@example.com");
        assert!(h.services.tokens.verify(&session.tokens.access_token).is_ok());
        assert!(h.services.tokens.verify(&session.tokens.refresh_token).is_ok());

        assert!(h.services.store.mfa_code_for_user(identity.id).await.unwrap().is_none());
        assert_eq!(
            h.services.accounts.verify_code("ada@example.com", &code.code).await.unwrap_err(),
            AuthError::CodeNotFound
        );
    }

    #[tokio::test]
    async fn reissuing_leaves_only_the_latest_code() {
        let h = harness();
        let identity = active_user(&h, "ada@example.com", true).await;
        let manager = &h.services.verification;

        let first = manager.issue_mfa_code(identity.id).await.unwrap();
        let second = manager.issue_mfa_code(identity.id).await.unwrap();

        let live = h.services.store.mfa_code_for_user(identity.id).await.unwrap();
        assert_eq!(live, Some(second.clone()));
        if first.code != second.code {
            assert_eq!(
                manager.verify_mfa_code("ada@example.com", &first.code).await.unwrap_err(),
                AuthError::CodeNotFound
            );
        }
        assert!(manager.verify_mfa_code("ada@example.com", &second.code).await.is_ok());
    }

    #[tokio::test]
    async fn code_presented_for_another_email_is_rejected_and_kept() {
        let h = harness();
        let owner = active_user(&h, "ada@example.com", true).await;
        active_user(&h, "eve@example.com", false).await;
        let manager = &h.services.verification;

        let code = manager.issue_mfa_code(owner.id).await.unwrap();
        assert_eq!(
            manager.verify_mfa_code("eve@example.com", &code.code).await.unwrap_err(),
            AuthError::CodeMismatch
        );
        assert_eq!(
            manager.verify_mfa_code("ghost@example.com", &code.code).await.unwrap_err(),
            AuthError::CodeMismatch
        );
        assert_eq!(
            h.services.store.mfa_code_for_user(owner.id).await.unwrap(),
            Some(code.clone())
        );

        let identity = manager.verify_mfa_code("ada@example.com", &code.code).await.unwrap();
        assert_eq!(identity.id, owner.id);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_without_side_effects() {
        let h = harness();
        let identity = active_user(&h, "ada@example.com", true).await;
        let manager = &h.services.verification;
        let code = manager.issue_mfa_code(identity.id).await.unwrap();

        h.clock.advance(Duration::hours(24));
        assert_eq!(
            manager.verify_mfa_code("ada@example.com", &code.code).await.unwrap_err(),
            AuthError::CodeExpired
        );
        assert_eq!(
            h.services.store.mfa_code_for_user(identity.id).await.unwrap(),
            Some(code)
        );
    }

    #[tokio::test]
    async fn only_one_concurrent_consumer_wins() {
        let h = harness();
        let identity = active_user(&h, "ada@example.com", true).await;
        let manager = &h.services.verification;
        let code = manager.issue_mfa_code(identity.id).await.unwrap();

        let (a, b) = tokio::join!(
            manager.verify_mfa_code("ada@example.com", &code.code),
            manager.verify_mfa_code("ada@example.com", &code.code),
        );
        let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!([a, b].into_iter().any(|r| r == Err(AuthError::CodeNotFound)));
    }

    #[tokio::test]
    async fn password_reset_requires_matching_passwords() {
        let h = harness();
        let identity = active_user(&h, "ada@example.com", false).await;
        let manager = &h.services.verification;

        let link = manager.issue_password_reset_link("ada@example.com").await.unwrap();
        assert_eq!(link.expires_at, Some(h.clock.now() + Duration::hours(24)));
        let before = h.services.store.find_by_id(identity.id).await.unwrap().unwrap();

        assert_eq!(
            manager
                .consume_password_reset(&link.key, "new-password", "other-password")
                .await
                .unwrap_err(),
            AuthError::PasswordMismatch
        );
        let after = h.services.store.find_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(before.password_hash, after.password_hash);
        assert_eq!(
            manager.verify_password_reset_key(&link.key).await.unwrap().id,
            identity.id
        );

        manager
            .consume_password_reset(&link.key, "new-password", "new-password")
            .await
            .unwrap();
        assert!(h.services.accounts.login("ada@example.com", "new-password").await.is_ok());
        assert_eq!(
            h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap_err(),
            AuthError::CredentialsInvalid
        );
        assert_eq!(
            manager
                .consume_password_reset(&link.key, "again", "again")
                .await
                .unwrap_err(),
            AuthError::ResetKeyNotFound
        );
    }

    #[tokio::test]
    async fn reset_links_expire_and_are_superseded() {
        let h = harness();
        active_user(&h, "ada@example.com", false).await;
        let manager = &h.services.verification;

        let first = manager.issue_password_reset_link("ada@example.com").await.unwrap();
        let second = manager.issue_password_reset_link("ada@example.com").await.unwrap();
        assert_eq!(
            manager.verify_password_reset_key(&first.key).await.unwrap_err(),
            AuthError::ResetKeyNotFound
        );
        assert!(manager.verify_password_reset_key(&second.key).await.is_ok());

        h.clock.advance(Duration::hours(24));
        assert_eq!(
            manager.verify_password_reset_key(&second.key).await.unwrap_err(),
            AuthError::ResetKeyNotFound
        );
        assert_eq!(
            manager.issue_password_reset_link("ghost@example.com").await.unwrap_err(),
            AuthError::IdentityNotFound("ghost@example.com".into())
        );
    }

    #[tokio::test]
    async fn unknown_role_is_rejected_without_association() {
        let h = harness();
        let new = NewIdentity {
            id: UserId::new(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "x".into(),
            phone: None,
            mfa_enabled: false,
            created_at: h.clock.now(),
        };
        let link = h.services.verification.account_link(new.id);
        let user_role = h.services.roles.role_by_name(ROLE_USER).await.unwrap();
        let identity = h
            .services
            .store
            .register_identity(new, user_role.id, link)
            .await
            .unwrap();

        assert_eq!(
            h.services
                .roles
                .add_role_to_user(identity.id, "NO_SUCH_ROLE")
                .await
                .unwrap_err(),
            AuthError::RoleNotFound("NO_SUCH_ROLE".into())
        );
        assert_eq!(
            h.services.store.role_for_user(identity.id).await.unwrap().unwrap().name,
            ROLE_USER
        );

        h.services
            .roles
            .add_role_to_user(identity.id, "ROLE_ADMIN")
            .await
            .unwrap();
        let role = h.services.roles.role_by_user_email("ada@example.com").await.unwrap();
        assert_eq!(role.name, "ROLE_ADMIN");
    }

    #[tokio::test]
    async fn refresh_mints_a_new_access_token() {
        let h = harness();
        active_user(&h, "ada@example.com", false).await;
        let session = authenticated(h.services.accounts.login("ada@example.com", PASSWORD).await.unwrap());

        h.clock.advance(Duration::minutes(31));
        assert_eq!(
            h.services.tokens.verify(&session.tokens.access_token).unwrap_err(),
            AuthError::TokenExpired
        );

        let refreshed = h.services.accounts.refresh(&session.tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.tokens.refresh_token, session.tokens.refresh_token);
        assert!(h.services.tokens.verify(&refreshed.tokens.access_token).is_ok());

        assert!(matches!(
            h.services.accounts.refresh(&refreshed.tokens.access_token).await,
            Err(AuthError::TokenInvalid(_))
        ));

        h.clock.advance(Duration::days(5));
        assert_eq!(
            h.services.accounts.refresh(&session.tokens.refresh_token).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn account_links_resolve_through_the_store() {
        let h = harness();
        let identity = h
            .services
            .accounts
            .register(form("ada@example.com", false))
            .await
            .unwrap();
        let link = h.notifier.last_link_for("ada@example.com").unwrap();
        let stored = h.services.store.find_account_link(&link.key).await.unwrap().unwrap();
        assert_eq!(stored.user_id, identity.id);
    }

    /// Counts every hash comparison the services ask for.
    struct CountingEncoder {
        inner: BcryptPasswordEncoder,
        comparisons: AtomicUsize,
    }

    #[async_trait]
    impl PasswordEncoder for CountingEncoder {
        async fn encode(&self, raw: &str) -> AuthResult<String> {
            self.inner.encode(raw).await
        }

        async fn matches(&self, raw: &str, hash: &str) -> AuthResult<bool> {
            self.comparisons.fetch_add(1, Ordering::SeqCst);
            self.inner.matches(raw, hash).await
        }

        async fn decoy_match(&self, raw: &str) -> AuthResult<()> {
            self.comparisons.fetch_add(1, Ordering::SeqCst);
            self.inner.decoy_match(raw).await
        }
    }

    #[tokio::test]
    async fn unknown_email_costs_one_comparison_like_a_wrong_password() {
        let encoder = Arc::new(CountingEncoder {
            inner: BcryptPasswordEncoder::new(4),
            comparisons: AtomicUsize::new(0),
        });
        let h = harness_with(encoder.clone());
        active_user(&h, "ada@example.com", false).await;

        encoder.comparisons.store(0, Ordering::SeqCst);
        let err = h.services.accounts.login("nobody@example.com", PASSWORD).await.unwrap_err();
        assert_eq!(err, AuthError::CredentialsInvalid);
        assert_eq!(encoder.comparisons.load(Ordering::SeqCst), 1);

        encoder.comparisons.store(0, Ordering::SeqCst);
        let err = h.services.accounts.login("ada@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AuthError::CredentialsInvalid);
        assert_eq!(encoder.comparisons.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_survives_a_failed_link_delivery() {
        let h = harness();
        h.notifier.set_offline(true);

        let identity = h
            .services
            .accounts
            .register(form("ada@example.com", false))
            .await
            .unwrap();
        assert!(h.notifier.deliveries().is_empty());

        let stored = h.services.store.find_by_id(identity.id).await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(
            h.services.roles.role_by_user_id(identity.id).await.unwrap().name,
            ROLE_USER
        );
        assert_eq!(
            h.services.accounts.register(form("ada@example.com", false)).await.unwrap_err(),
            AuthError::EmailAlreadyInUse
        );

        // the account is recoverable once delivery works again
        h.notifier.set_offline(false);
        let resent = h
            .services
            .accounts
            .resend_account_link("ADA@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.notifier.last_link_for("ada@example.com"), Some(resent.clone()));
        assert_eq!(
            h.services
                .verification
                .consume_account_verification_link(&resent.key)
                .await
                .unwrap(),
            AccountVerification::Verified
        );
        assert!(matches!(
            h.services.accounts.login("ada@example.com", PASSWORD).await,
            Ok(LoginOutcome::Authenticated(_))
        ));
    }

    #[tokio::test]
    async fn resend_skips_verified_accounts_and_unknown_emails() {
        let h = harness();
        active_user(&h, "ada@example.com", false).await;
        let sent_before = h.notifier.deliveries().len();

        assert_eq!(h.services.accounts.resend_account_link("ada@example.com").await.unwrap(), None);
        assert_eq!(h.notifier.deliveries().len(), sent_before);
        assert_eq!(
            h.services.accounts.resend_account_link("ghost@example.com").await.unwrap_err(),
            AuthError::IdentityNotFound("ghost@example.com".into())
        );
    }

    /// Hands out one fixed link key, so the second registration collides.
    struct FixedKeys;

    impl SecretGenerator for FixedKeys {
        fn mfa_code(&self) -> String {
            "ABCD1234".into()
        }

        fn link_key(&self) -> String {
            "fixed-key".into()
        }
    }

    #[tokio::test]
    async fn failed_registration_write_leaves_no_identity() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
        let notifier = Arc::new(RecordingNotifier::new());
        let deps = AuthDependencies {
            tokens: Arc::new(TokenService::new(b"integration-secret", clock.clone()).unwrap()),
            passwords: Arc::new(BcryptPasswordEncoder::new(4)),
            secrets: Arc::new(FixedKeys),
            notifier: notifier.clone(),
            clock,
            settings: VerificationSettings::default(),
        };
        let services = AuthServices::new(Arc::new(InMemoryStore::new()), deps);

        services.accounts.register(form("ada@example.com", false)).await.unwrap();
        let err = services.accounts.register(form("bob@example.com", false)).await.unwrap_err();

        assert!(matches!(err, AuthError::Unexpected(_)));
        assert!(!services.store.email_exists("bob@example.com").await.unwrap());
        assert!(notifier.last_link_for("bob@example.com").is_none());
    }
}
