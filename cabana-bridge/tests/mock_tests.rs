//! End-to-end scenarios against the mock equipment: queue → mock bus →
//! loopback → codec → dispatcher → state, the same path live traffic
//! takes.

use cabana_bridge::queue::QueueError;
use cabana_bridge::{Engine, Frame, QueueConfig};

#[tokio::test(start_paused = true)]
async fn chlorinator_set_output_updates_state_within_band() {
    let engine = Engine::mock(QueueConfig::default());

    let reply = engine
        .queue()
        .submit(Frame::chlorinator(1, 17, vec![100]))
        .await
        .unwrap();

    assert_eq!(reply.action, 18);
    assert_eq!(reply.payload.len(), 2);
    // Full output reads at the top of the 56..=90 band.
    assert!((88..=90).contains(&reply.payload[0]));

    {
        let state = engine.state();
        let state = state.read().unwrap();
        assert!(
            (4400..=4500).contains(&state.chlorinator.salt_ppm),
            "salt {} outside the commanded band",
            state.chlorinator.salt_ppm
        );
        assert_eq!(state.chlorinator.status, 0);
    }

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn chlorinator_model_query_fills_the_state() {
    let engine = Engine::mock(QueueConfig::default());

    let reply = engine
        .queue()
        .submit(Frame::chlorinator(1, 20, vec![0]))
        .await
        .unwrap();
    assert_eq!(reply.action, 3);

    {
        let state = engine.state();
        let state = state.read().unwrap();
        assert_eq!(
            state.chlorinator.model.as_deref(),
            Some("INTELLICHLOR--60")
        );
    }

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_action_aborts_after_the_retry_envelope() {
    let engine = Engine::mock(QueueConfig::default());

    // Chlorinator action 19 is not programmed in the mock; the request
    // retries against silence until the bound.
    let err = engine
        .queue()
        .submit(Frame::chlorinator(1, 19, vec![]))
        .await
        .unwrap_err();
    assert_eq!(err, QueueError::Aborted { attempts: 20 });

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pump_speed_command_then_status_poll() {
    let engine = Engine::mock(QueueConfig::default());
    let queue = engine.queue();

    // Commanded speed rides in the last two payload bytes, big-endian.
    let ack = queue
        .submit(Frame::command(96, 1, vec![2, 196, 3, 39]))
        .await
        .unwrap();
    assert_eq!(ack.payload, vec![1]);

    let status = queue.submit(Frame::command(96, 7, vec![])).await.unwrap();
    assert_eq!(status.action, 7);
    assert_eq!(status.payload.len(), 15);

    {
        let state = engine.state();
        let state = state.read().unwrap();
        let pump = state.pumps.get(&96).expect("pump slot populated");
        assert_eq!(pump.rpm, 807);
        assert!(pump.watts <= 567, "watts {} above jitter ceiling", pump.watts);
    }

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn panel_set_command_is_acked_by_the_mock() {
    let engine = Engine::mock(QueueConfig::default());

    let reply = engine
        .queue()
        .submit(Frame::command(16, 131, vec![1, 30, 8]))
        .await
        .unwrap();
    assert_eq!(reply.action, 1);
    assert_eq!(reply.payload, vec![131]);
    assert_eq!(reply.source, 16);

    // The ack traveled the real inbound path.
    assert_eq!(engine.messages_seen(), 1);

    engine.shutdown().await;
}
