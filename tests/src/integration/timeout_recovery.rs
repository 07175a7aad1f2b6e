//! # Timeout Recovery
//!
//! Lost and late frames, the timed-out phases they lead to, and getting the
//! channel back with `reset_after_error`.
//!
//! Default timing: 500 ms for the confirmation, 500 ms base for the response.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, Instant};

    use dpa_protocol::{
        DpaRequest, NodeAddress, Phase, ProtocolConfig, ProtocolError, ProtocolStateApi,
    };

    use crate::integration::init_test_logging;
    use crate::mesh::{MeshBehaviour, MeshHarness};

    fn harness(config: ProtocolConfig, behaviour: MeshBehaviour) -> MeshHarness {
        init_test_logging();
        MeshHarness::start(config, behaviour).unwrap()
    }

    fn unicast() -> DpaRequest {
        DpaRequest::new(NodeAddress::node(9), 0x06, 0x01)
    }

    // =============================================================================
    // LOST FRAMES
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_lost_confirmation_times_out_and_blocks_until_reset() {
        let config = ProtocolConfig::default().with_send_wait_timeout_ms(300);
        let harness = harness(
            config,
            MeshBehaviour {
                drop_confirmation: true,
                ..MeshBehaviour::default()
            },
        );
        let start = Instant::now();

        harness.channel.send_request(&unicast()).await.unwrap();
        harness
            .wait_for_phase(Phase::WaitingForConfirmationTimedOut)
            .await;
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(510));
        assert_eq!(harness.listener.confirmation_timeouts(), 1);

        // Timed-out phases are left only by an explicit reset.
        let result = harness.channel.send_request(&unicast()).await;
        assert!(matches!(result, Err(ProtocolError::StateChangeTimeout(_))));
        assert_eq!(
            harness.machine().get_state(),
            Phase::WaitingForConfirmationTimedOut
        );

        harness.machine().reset_after_error().await.unwrap();
        assert!(harness.machine().is_free_for_send());
        assert_eq!(harness.listener.free_for_send_count(), 1);

        harness.mesh().set_behaviour(MeshBehaviour::default());
        harness.channel.send_request(&unicast()).await.unwrap();
        harness.wait_for_phase(Phase::FreeForSend).await;
        assert_eq!(harness.listener.free_for_send_count(), 2);
        assert_eq!(harness.listener.confirmation_timeouts(), 1);

        harness.shutdown().await;
    }

    /// Confirmation at 20 ms opens a response wait of
    /// 500 + 160 + 100 ms, so the timeout fires at 780 ms.
    #[tokio::test(start_paused = true)]
    async fn test_lost_response_times_out() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                drop_response: true,
                ..MeshBehaviour::default()
            },
        );
        let start = Instant::now();

        harness.channel.send_request(&unicast()).await.unwrap();
        harness
            .wait_for_phase(Phase::WaitingForResponseTimedOut)
            .await;
        assert!(start.elapsed() >= Duration::from_millis(780));
        assert!(start.elapsed() < Duration::from_millis(790));
        assert_eq!(harness.listener.response_timeouts(), 1);
        assert_eq!(harness.listener.confirmation_timeouts(), 0);

        harness.machine().reset_after_error().await.unwrap();
        assert!(harness.machine().is_free_for_send());

        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_coordinator_response_times_out() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                drop_response: true,
                ..MeshBehaviour::default()
            },
        );
        let start = Instant::now();

        harness
            .channel
            .send_request(&DpaRequest::new(NodeAddress::COORDINATOR, 0x00, 0x02))
            .await
            .unwrap();
        harness
            .wait_for_phase(Phase::WaitingForResponseTimedOut)
            .await;
        // Base wait plus the fixed margin, no routing time.
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < Duration::from_millis(610));

        harness.shutdown().await;
    }

    // =============================================================================
    // LATE FRAMES
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_late_confirmation_refused_with_state_timeout() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                confirmation_delay: Duration::from_millis(600),
                drop_response: true,
                ..MeshBehaviour::default()
            },
        );

        harness.channel.send_request(&unicast()).await.unwrap();
        sleep(Duration::from_millis(700)).await;

        let outcomes = harness.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_ref().unwrap_err().is_state_timeout());
        assert_eq!(
            harness.machine().get_state(),
            Phase::WaitingForConfirmationTimedOut
        );
        assert_eq!(harness.listener.confirmation_timeouts(), 1);

        harness.shutdown().await;
    }

    /// A confirmation arriving exactly at the deadline is either consumed
    /// or refused, never both.
    #[tokio::test(start_paused = true)]
    async fn test_confirmation_at_deadline_resolves_one_way() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                confirmation_delay: Duration::from_millis(500),
                drop_response: true,
                ..MeshBehaviour::default()
            },
        );

        harness.channel.send_request(&unicast()).await.unwrap();
        sleep(Duration::from_millis(550)).await;

        let outcomes = harness.outcomes();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            Ok(phase) => {
                assert_eq!(*phase, Phase::WaitingForResponse);
                assert_eq!(harness.listener.confirmation_timeouts(), 0);
                assert_eq!(harness.machine().get_state(), Phase::WaitingForResponse);
            }
            Err(e) => {
                assert!(e.is_state_timeout());
                assert_eq!(harness.listener.confirmation_timeouts(), 1);
                assert_eq!(
                    harness.machine().get_state(),
                    Phase::WaitingForConfirmationTimedOut
                );
            }
        }

        harness.shutdown().await;
    }

    // =============================================================================
    // RUNTIME CONTROL
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_changed_at_runtime() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                confirmation_delay: Duration::from_millis(80),
                ..MeshBehaviour::default()
            },
        );

        harness
            .machine()
            .set_time_to_wait_for_confirmation(50)
            .unwrap();
        harness.channel.send_request(&unicast()).await.unwrap();
        harness
            .wait_for_phase(Phase::WaitingForConfirmationTimedOut)
            .await;

        // Let the late confirmation and response drain.
        sleep(Duration::from_millis(200)).await;
        harness.machine().reset_after_error().await.unwrap();

        harness
            .machine()
            .set_time_to_wait_for_confirmation(200)
            .unwrap();
        harness.channel.send_request(&unicast()).await.unwrap();
        harness.wait_for_phase(Phase::FreeForSend).await;
        assert_eq!(harness.listener.confirmation_timeouts(), 1);
        assert_eq!(harness.listener.free_for_send_count(), 2);

        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_without_timeout_is_refused() {
        let harness = harness(ProtocolConfig::default(), MeshBehaviour::default());

        let err = harness.machine().reset_after_error().await.unwrap_err();
        assert!(err.is_contract_violation());

        harness.channel.send_request(&unicast()).await.unwrap();
        let err = harness.machine().reset_after_error().await.unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(harness.listener.free_for_send_count(), 0);

        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_listener_misses_timeout() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                drop_confirmation: true,
                ..MeshBehaviour::default()
            },
        );

        harness.channel.send_request(&unicast()).await.unwrap();
        harness.machine().unregister_listener();
        harness
            .wait_for_phase(Phase::WaitingForConfirmationTimedOut)
            .await;
        assert_eq!(harness.listener.total(), 0);

        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_mid_exchange() {
        let harness = harness(
            ProtocolConfig::default(),
            MeshBehaviour {
                drop_confirmation: true,
                ..MeshBehaviour::default()
            },
        );

        harness.channel.send_request(&unicast()).await.unwrap();
        harness.machine().destroy().await;

        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.listener.total(), 0);
        assert!(matches!(
            harness.channel.send_request(&unicast()).await,
            Err(ProtocolError::NotRunning)
        ));
        assert!(matches!(
            harness.machine().reset_after_error().await,
            Err(ProtocolError::NotRunning)
        ));

        harness.shutdown().await;
    }
}
