// Integration tests for the playback slot pool
//
// These tests drive the helper against the simulated sound service and check
// slot allocation, reference numbers, completion reaping and buffer pinning.

use anyhow::Result;
use sound_helper::audio::{ServiceError, SoundCommand, UNITY_RATE};
use sound_helper::{
    CompressionType, HelperConfig, HelperError, NotifyFlag, PlayStatus, RefNum,
    SimulatedSoundService, SimulatorConfig, SoundBuffer, SoundFormat, SoundHelper, SoundLibrary,
};
use std::time::Duration;

type Helper = SoundHelper<SimulatedSoundService>;

fn helper_with(channels: usize, simulator: SimulatorConfig) -> Result<Helper> {
    let config = HelperConfig {
        channels,
        ..Default::default()
    };
    Ok(SoundHelper::new(
        SimulatedSoundService::new(simulator),
        NotifyFlag::new(),
        config,
    )?)
}

fn helper(channels: usize) -> Result<Helper> {
    helper_with(channels, SimulatorConfig::default())
}

/// 8-bit mono sound at 10 kHz, so one byte per 0.1 ms.
fn test_sound(millis: usize) -> SoundBuffer {
    let format = SoundFormat {
        channels: 1,
        sample_rate: 10_000,
        sample_size: 8,
        compression: CompressionType::NONE,
    };
    let samples = vec![0x80; millis * 10];
    let sound = SoundBuffer::from_samples(format, &samples).expect("test sound fits a header");
    sound.set_purgeable(true);
    sound
}

fn run_for(helper: &mut Helper, millis: u64) {
    helper
        .service_mut()
        .advance(Duration::from_millis(millis));
    if helper.needs_idle() {
        helper.idle();
    }
}

#[test]
fn test_pool_exhaustion_reports_outa_channels() -> Result<()> {
    let mut helper = helper(3)?;
    let sound = test_sound(100);

    for _ in 0..3 {
        helper.play(Some(&sound))?;
    }
    assert_eq!(helper.in_use_count(), 3);

    let extra = test_sound(100);
    let err = helper.play(Some(&extra)).unwrap_err();
    assert_eq!(err, HelperError::OutaChannels);
    assert!(
        extra.state().purgeable,
        "Rejected sound should get its state back"
    );

    run_for(&mut helper, 150);
    assert_eq!(helper.in_use_count(), 0, "All slots should be reaped");
    helper.play(Some(&extra))?;

    Ok(())
}

#[test]
fn test_default_pool_size() -> Result<()> {
    let helper = helper(0)?;
    assert_eq!(helper.capacity(), 4);
    Ok(())
}

#[test]
fn test_reference_numbers_increase() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(10);

    let mut last = RefNum(0);
    for _ in 0..10 {
        let ref_num = helper.play(Some(&sound))?;
        assert!(ref_num > last, "{} should follow {}", ref_num, last);
        last = ref_num;
        helper.stop(ref_num)?;
    }

    Ok(())
}

#[test]
fn test_status_distinguishes_unissued_finished_and_live() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    assert_eq!(helper.status(RefNum(0)), PlayStatus::Error);
    assert_eq!(helper.status(RefNum(1)), PlayStatus::Error);

    let first = helper.play(Some(&sound))?;
    let second = helper.play(Some(&sound))?;
    helper.pause(second)?;

    assert_eq!(helper.status(first), PlayStatus::Playing);
    assert_eq!(helper.status(second), PlayStatus::Paused);
    assert_eq!(helper.status(RefNum(second.0 + 1)), PlayStatus::Error);

    helper.stop(first)?;
    assert_eq!(helper.status(first), PlayStatus::Finished);

    Ok(())
}

#[test]
fn test_completion_is_reaped_by_idle() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    let ref_num = helper.play(Some(&sound))?;
    assert!(!sound.state().purgeable, "Playing sound should be pinned");
    assert!(sound.state().locked, "Playing sound should be locked");

    helper.service_mut().advance(Duration::from_millis(50));
    assert!(!helper.needs_idle());

    helper.service_mut().advance(Duration::from_millis(60));
    assert!(helper.needs_idle(), "Completion should raise attention");
    assert_eq!(
        helper.status(ref_num),
        PlayStatus::Playing,
        "Slot stays in use until reaped"
    );

    let report = helper.idle();
    assert_eq!(report.slots_released, 1);
    assert!(!helper.needs_idle());
    assert_eq!(helper.status(ref_num), PlayStatus::Finished);
    assert_eq!(helper.service().open_channels(), 0);

    let state = sound.state();
    assert!(state.purgeable && !state.locked, "State should be restored");

    Ok(())
}

#[test]
fn test_retrigger_keeps_buffer_pinned_until_both_finish() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    let first = helper.play(Some(&sound))?;
    run_for(&mut helper, 50);
    let second = helper.play(Some(&sound))?;

    run_for(&mut helper, 60);
    assert_eq!(helper.status(first), PlayStatus::Finished);
    assert_eq!(helper.status(second), PlayStatus::Playing);
    assert!(
        !sound.state().purgeable,
        "Buffer still playing on the second slot"
    );

    run_for(&mut helper, 60);
    assert_eq!(helper.status(second), PlayStatus::Finished);
    assert!(sound.state().purgeable, "Original state restored at last");

    Ok(())
}

#[test]
fn test_retrigger_stop_order_does_not_matter() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    let first = helper.play(Some(&sound))?;
    let second = helper.play(Some(&sound))?;

    helper.stop(second)?;
    assert!(!sound.state().purgeable);
    helper.stop(first)?;
    assert!(sound.state().purgeable);

    Ok(())
}

#[test]
fn test_pause_and_resume_state_errors() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);
    let ref_num = helper.play(Some(&sound))?;

    assert_eq!(
        helper.resume(ref_num).unwrap_err(),
        HelperError::AlreadyContinued
    );

    helper.pause(ref_num)?;
    let channel = helper.get_channel(ref_num)?;
    assert_eq!(helper.service().channel_rate(channel), Some(0));

    assert_eq!(helper.pause(ref_num).unwrap_err(), HelperError::AlreadyPaused);
    assert_eq!(
        helper.service().channel_rate(channel),
        Some(0),
        "Second pause must not touch the channel"
    );

    helper.resume(ref_num)?;
    assert_eq!(
        helper.resume(ref_num).unwrap_err(),
        HelperError::AlreadyContinued
    );
    assert_eq!(helper.service().channel_rate(channel), Some(UNITY_RATE));

    let unknown = RefNum(ref_num.0 + 10);
    assert_eq!(
        helper.pause(unknown).unwrap_err(),
        HelperError::BadReference(unknown)
    );

    Ok(())
}

#[test]
fn test_rate_pause_halts_the_sound() -> Result<()> {
    let mut helper = helper(1)?;
    let sound = test_sound(100);
    let ref_num = helper.play(Some(&sound))?;

    run_for(&mut helper, 40);
    helper.pause(ref_num)?;
    run_for(&mut helper, 1000);
    assert_eq!(helper.status(ref_num), PlayStatus::Paused);

    helper.resume(ref_num)?;
    run_for(&mut helper, 40);
    assert_eq!(helper.status(ref_num), PlayStatus::Playing);
    run_for(&mut helper, 30);
    assert_eq!(helper.status(ref_num), PlayStatus::Finished);

    Ok(())
}

#[test]
fn test_queue_pause_when_rate_is_unsupported() -> Result<()> {
    let simulator = SimulatorConfig {
        rate_commands: false,
        ..Default::default()
    };
    let mut helper = helper_with(1, simulator)?;
    let sound = test_sound(100);
    let ref_num = helper.play(Some(&sound))?;
    let channel = helper.get_channel(ref_num)?;

    helper.pause(ref_num)?;
    assert!(helper.service().is_queue_paused(channel));

    // The sampled sound plays out, but the completion stays queued.
    run_for(&mut helper, 200);
    assert!(!helper.service().is_playing(channel));
    assert_eq!(helper.service().queued_commands(channel), 1);
    assert_eq!(helper.status(ref_num), PlayStatus::Paused);

    helper.resume(ref_num)?;
    assert!(helper.needs_idle(), "Resume should release the completion");
    helper.idle();
    assert_eq!(helper.status(ref_num), PlayStatus::Finished);

    Ok(())
}

#[test]
fn test_rate_pause_can_be_disabled() -> Result<()> {
    let config = HelperConfig {
        channels: 1,
        rate_pause: false,
        ..Default::default()
    };
    let mut helper = SoundHelper::new(
        SimulatedSoundService::default(),
        NotifyFlag::new(),
        config,
    )?;
    let ref_num = helper.play(Some(&test_sound(100)))?;
    let channel = helper.get_channel(ref_num)?;

    helper.pause(ref_num)?;
    assert!(helper.service().is_queue_paused(channel));
    assert_eq!(helper.service().channel_rate(channel), Some(UNITY_RATE));

    Ok(())
}

#[test]
fn test_stop_releases_immediately() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);
    let ref_num = helper.play(Some(&sound))?;

    helper.stop(ref_num)?;
    assert_eq!(helper.in_use_count(), 0);
    assert_eq!(helper.service().open_channels(), 0);
    assert_eq!(helper.status(ref_num), PlayStatus::Finished);
    assert!(sound.state().purgeable);

    assert_eq!(
        helper.stop(ref_num).unwrap_err(),
        HelperError::BadReference(ref_num),
        "Stopping twice is reported, not fatal"
    );

    Ok(())
}

#[test]
fn test_stop_all() -> Result<()> {
    let mut helper = helper(4)?;
    let sound = test_sound(100);
    let refs = (0..3)
        .map(|_| helper.play(Some(&sound)))
        .collect::<Result<Vec<_>, _>>()?;

    helper.stop_all();
    assert_eq!(helper.in_use_count(), 0);
    for ref_num in refs {
        assert_eq!(helper.status(ref_num), PlayStatus::Finished);
    }
    assert!(sound.state().purgeable);

    Ok(())
}

#[test]
fn test_pool_of_two_scenario() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    let first = helper.play(Some(&sound))?;
    let second = helper.play(Some(&sound))?;
    assert_eq!((first, second), (RefNum(1), RefNum(2)));

    let channel = helper.get_channel(first)?;
    assert!(helper.service_mut().finish_playback(channel));
    helper.idle();

    assert_eq!(helper.status(first), PlayStatus::Finished);
    assert_eq!(helper.status(second), PlayStatus::Playing);
    assert_eq!(helper.in_use_count(), 1);

    let third = helper.play(Some(&sound))?;
    assert_eq!(third, RefNum(3));

    Ok(())
}

#[test]
fn test_spurious_callback_is_ignored() -> Result<()> {
    let mut helper = helper(1)?;
    let ref_num = helper.play(Some(&test_sound(100)))?;
    let channel = helper.get_channel(ref_num)?;

    let foreign = SoundCommand::Callback {
        param1: 0x1234_5678,
        param2: ref_num.0,
    };
    assert!(helper.service_mut().inject_callback(channel, foreign));
    assert!(!helper.needs_idle());
    helper.idle();
    assert_eq!(helper.status(ref_num), PlayStatus::Playing);

    Ok(())
}

#[test]
fn test_channel_failure_leaves_no_session() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    helper
        .service_mut()
        .fail_next_channel(ServiceError::MemFull);
    let err = helper.play(Some(&sound)).unwrap_err();
    assert_eq!(err, HelperError::Service(ServiceError::MemFull));
    assert_eq!(helper.in_use_count(), 0);
    assert!(sound.state().purgeable);

    let ref_num = helper.play(Some(&sound))?;
    assert_eq!(ref_num, RefNum(1), "Failed start must not consume a reference");

    Ok(())
}

#[test]
fn test_play_failure_unwinds_channel() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);

    helper
        .service_mut()
        .fail_next_play(ServiceError::Other(-1));
    let err = helper.play(Some(&sound)).unwrap_err();
    assert_eq!(err, HelperError::Service(ServiceError::Other(-1)));
    assert_eq!(helper.in_use_count(), 0);
    assert_eq!(helper.service().open_channels(), 0);

    let state = sound.state();
    assert!(state.purgeable && !state.locked);

    Ok(())
}

#[test]
fn test_channel_only_session() -> Result<()> {
    let mut helper = helper(1)?;

    let ref_num = helper.play(None)?;
    let channel = helper.get_channel(ref_num)?;
    assert!(!helper.service().is_playing(channel));

    run_for(&mut helper, 10_000);
    assert_eq!(
        helper.status(ref_num),
        PlayStatus::Playing,
        "Channel-only sessions never complete on their own"
    );

    helper.stop(ref_num)?;
    assert_eq!(helper.in_use_count(), 0);

    Ok(())
}

#[test]
fn test_play_by_id() -> Result<()> {
    let mut helper = helper(1)?;
    let mut library = SoundLibrary::new();
    library.insert(5, test_sound(50));

    let ref_num = helper.play_by_id(&library, 5)?;
    assert_eq!(helper.status(ref_num), PlayStatus::Playing);

    assert_eq!(
        helper.play_by_id(&library, 7).unwrap_err(),
        HelperError::SoundNotFound(7)
    );

    Ok(())
}

#[test]
fn test_shutdown_drains_pool() -> Result<()> {
    let mut helper = helper(2)?;
    let sound = test_sound(100);
    helper.play(Some(&sound))?;
    let pending = helper.play(Some(&sound))?;

    // One completion is already waiting for a reap pass.
    let channel = helper.get_channel(pending)?;
    helper.service_mut().finish_playback(channel);
    assert!(helper.needs_idle());

    let report = helper.shutdown();
    assert!(report.drained);
    assert_eq!(report.outstanding_slots, 0);
    assert_eq!(helper.in_use_count(), 0);
    assert_eq!(helper.service().open_channels(), 0);
    assert!(sound.state().purgeable);

    Ok(())
}
