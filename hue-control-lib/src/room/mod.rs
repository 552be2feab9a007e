use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::{join_all, try_join_all};
use log::{debug, info};
use tokio::time::sleep;

use crate::control_interface::BridgeApi;
use crate::errors::Error;
use crate::light::color::NamedHue;
use crate::light::state::{Group, GroupState, Light, LightCommand, LightState, DEFAULT_SATURATION};

/// Pause after each light's command unless configured otherwise.
pub const DEFAULT_COMMAND_DELAY: Duration = Duration::from_millis(250);

/// Called with a light's refreshed state after its command and pause.
pub type PostSendCallback = Arc<dyn Fn(&Light) + Send + Sync>;

/**
Controls every light of one room (bridge group) at once.

The member lights and their states are captured when the controller is built
and never refreshed. Every command goes to all captured lights, and
[`RoomController::restore`] puts them back the way they were found.
 */
pub struct RoomController<C: BridgeApi> {
    client: C,
    room: String,
    group_id: String,
    lights: Vec<String>,
    initial_states: Vec<(String, LightState)>,
    initial_action: LightCommand,
    initial_group_state: GroupState,
    delay: Duration,
    post_send: Option<PostSendCallback>,
}

impl<C: BridgeApi> fmt::Debug for RoomController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomController")
            .field("room", &self.room)
            .field("group_id", &self.group_id)
            .field("lights", &self.lights)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// The one group named `room`; zero or several matches are errors.
fn single_group(groups: Vec<Group>, room: &str) -> Result<Group> {
    let mut matching: Vec<Group> = groups.into_iter().filter(|g| g.name == room).collect();
    match matching.len() {
        0 => Err(Error::RoomNotFound(room.to_string()).into()),
        1 => Ok(matching.remove(0)),
        count => Err(Error::ambiguous_room(room, count).into()),
    }
}

impl<C: BridgeApi> RoomController<C> {
    /// Resolves `room` on the bridge and captures the state of its lights.
    pub async fn new(client: C, room: &str) -> Result<Self> {
        let group = single_group(client.get_groups().await?, room)?;
        debug!(
            "Room {:?} is group {} with lights {:?}",
            room, group.id, group.lights
        );

        let initial_states = try_join_all(group.lights.iter().map(|light_id| {
            let client = &client;
            async move {
                let light = client.get_light(light_id).await?;
                Ok::<_, anyhow::Error>((light_id.clone(), light.state))
            }
        }))
        .await?;

        Ok(RoomController {
            room: room.to_string(),
            group_id: group.id,
            lights: group.lights,
            initial_states,
            initial_action: group.action,
            initial_group_state: group.state,
            delay: DEFAULT_COMMAND_DELAY,
            post_send: None,
            client,
        })
    }

    /// Sets the pause after each light's command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Installs a callback that receives each light's state after its command.
    pub fn with_post_send<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Light) + Send + Sync + 'static,
    {
        self.post_send = Some(Arc::new(callback));
        self
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Member light ids, in group order.
    pub fn lights(&self) -> &[String] {
        &self.lights
    }

    /// Light states as found at construction, in group order.
    pub fn initial_states(&self) -> &[(String, LightState)] {
        &self.initial_states
    }

    pub fn initial_action(&self) -> &LightCommand {
        &self.initial_action
    }

    pub fn initial_group_state(&self) -> GroupState {
        self.initial_group_state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Current hue of one light, read from the bridge.
    pub async fn get_hue(&self, light_id: &str) -> Result<u16> {
        let light = self.client.get_light(light_id).await?;
        light
            .state
            .hue
            .ok_or_else(|| Error::NoHue(light_id.to_string()).into())
    }

    /// Current hue of every light, in group order.
    pub async fn get_hues(&self) -> Result<Vec<u16>> {
        try_join_all(self.lights.iter().map(|light_id| self.get_hue(light_id))).await
    }

    /**
    Sends `command` to every light concurrently.

    Each light gets its own command followed by the configured pause; after the
    pause the post-send callback, if any, sees that light's refreshed state. A
    failing light does not stop the others; its error is returned once every
    light has been sent to.
     */
    pub async fn send_command(&self, command: &LightCommand) -> Result<&Self> {
        debug!("Sending {:?} to room {:?}", command, self.room);
        join_all(
            self.lights
                .iter()
                .map(|light_id| self.send_to_light(command, light_id)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    async fn send_to_light(&self, command: &LightCommand, light_id: &String) -> Result<()> {
        self.client
            .send_command(command, std::slice::from_ref(light_id))
            .await?;
        sleep(self.delay).await;
        if let Some(post_send) = &self.post_send {
            let light = self.client.get_light(light_id).await?;
            post_send(&light);
        }
        Ok(())
    }

    pub async fn switch(&self, on: bool) -> Result<&Self> {
        self.send_command(&LightCommand::switch(on)).await
    }

    /// Brightness is clamped to 0..255.
    pub async fn dim(&self, brightness: i64) -> Result<&Self> {
        self.send_command(&LightCommand::brightness(brightness))
            .await
    }

    /// Hue wraps around the wheel; saturation is clamped to 0..254.
    pub async fn set_hue(&self, hue: i64, saturation: i64) -> Result<&Self> {
        self.send_command(&LightCommand::hue(hue, saturation)).await
    }

    pub async fn set_named_hue(&self, hue: NamedHue, saturation: i64) -> Result<&Self> {
        self.set_hue(hue.value() as i64, saturation).await
    }

    /// Full saturation.
    pub async fn set_hue_default(&self, hue: i64) -> Result<&Self> {
        self.set_hue(hue, DEFAULT_SATURATION as i64).await
    }

    /// Both coordinates are clamped to 0..1.
    pub async fn set_color(&self, x: f64, y: f64) -> Result<&Self> {
        self.send_command(&LightCommand::color(x, y)).await
    }

    /// Color temperature in mired.
    pub async fn temp(&self, ct: u16) -> Result<&Self> {
        self.send_command(&LightCommand::temperature(ct)).await
    }

    /// Puts every light back into the state captured at construction.
    ///
    /// Every light is restored even if another one fails.
    pub async fn restore(&self) -> Result<()> {
        info!("Restoring room {:?}", self.room);
        join_all(self.initial_states.iter().map(|(light_id, state)| {
            let command = LightCommand::from(state);
            async move {
                self.client
                    .send_command(&command, std::slice::from_ref(light_id))
                    .await
            }
        }))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeBridge {
        groups: Vec<Group>,
        lights: Mutex<HashMap<String, LightState>>,
        sent: Mutex<Vec<(String, LightCommand)>>,
        failing_light: Option<String>,
    }

    impl FakeBridge {
        fn office() -> Self {
            let mut lights = HashMap::new();
            lights.insert(
                "L1".to_string(),
                LightState {
                    on: true,
                    bri: Some(200),
                    hue: Some(1000),
                    sat: Some(100),
                    xy: Some([0.3, 0.4]),
                    ct: Some(300),
                    ..Default::default()
                },
            );
            lights.insert(
                "L2".to_string(),
                LightState {
                    on: false,
                    bri: Some(10),
                    hue: Some(40000),
                    sat: Some(254),
                    xy: Some([0.6, 0.2]),
                    ct: Some(153),
                    ..Default::default()
                },
            );
            lights.insert(
                "L3".to_string(),
                LightState {
                    on: true,
                    bri: Some(50),
                    ..Default::default()
                },
            );
            FakeBridge {
                groups: vec![
                    group("1", "Office", &["L1", "L2"]),
                    group("2", "Kitchen", &["L3"]),
                    group("3", "Hall", &["L1"]),
                    group("4", "Hall", &["L2"]),
                ],
                lights: Mutex::new(lights),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(String, LightCommand)> {
            self.sent.lock().unwrap().clone()
        }

        fn clear_sent(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    fn group(id: &str, name: &str, lights: &[&str]) -> Group {
        Group {
            id: id.to_string(),
            name: name.to_string(),
            lights: lights.iter().map(|l| l.to_string()).collect(),
            group_type: "Room".to_string(),
            action: LightCommand::switch(true),
            state: GroupState {
                all_on: false,
                any_on: true,
            },
        }
    }

    fn apply(state: &mut LightState, command: &LightCommand) {
        if let Some(on) = command.on {
            state.on = on;
        }
        if command.bri.is_some() {
            state.bri = command.bri;
        }
        if command.hue.is_some() {
            state.hue = command.hue;
        }
        if command.sat.is_some() {
            state.sat = command.sat;
        }
        if command.xy.is_some() {
            state.xy = command.xy;
        }
        if command.ct.is_some() {
            state.ct = command.ct;
        }
    }

    #[async_trait]
    impl BridgeApi for FakeBridge {
        async fn get_groups(&self) -> Result<Vec<Group>> {
            Ok(self.groups.clone())
        }

        async fn get_light(&self, light_id: &str) -> Result<Light> {
            let lights = self.lights.lock().unwrap();
            let state = lights.get(light_id).cloned().ok_or_else(|| Error::Api {
                code: 3,
                address: format!("/lights/{}", light_id),
                description: "resource not available".to_string(),
            })?;
            Ok(Light {
                id: light_id.to_string(),
                name: format!("Lamp {}", light_id),
                light_type: "Extended color light".to_string(),
                state,
            })
        }

        async fn check_connection(&self) -> Result<bool> {
            Ok(true)
        }

        async fn send_command(&self, command: &LightCommand, light_ids: &[String]) -> Result<()> {
            for light_id in light_ids {
                if self.failing_light.as_deref() == Some(light_id.as_str()) {
                    return Err(Error::Api {
                        code: 201,
                        address: format!("/lights/{}/state", light_id),
                        description: "parameter not modifiable".to_string(),
                    }
                    .into());
                }
                self.sent
                    .lock()
                    .unwrap()
                    .push((light_id.clone(), command.clone()));
                if let Some(state) = self.lights.lock().unwrap().get_mut(light_id) {
                    apply(state, command);
                }
            }
            Ok(())
        }

        async fn register(&self, _application_name: &str, _device_name: &str) -> Result<String> {
            Ok("key".to_string())
        }
    }

    async fn office() -> RoomController<FakeBridge> {
        RoomController::new(FakeBridge::office(), "Office")
            .await
            .unwrap()
            .with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_new_resolves_lights_in_order() {
        let controller = office().await;
        assert_eq!(controller.room(), "Office");
        assert_eq!(controller.group_id(), "1");
        assert_eq!(controller.lights(), &["L1".to_string(), "L2".to_string()]);
        let captured: Vec<&str> = controller
            .initial_states()
            .iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(captured, vec!["L1", "L2"]);
        assert_eq!(controller.initial_states()[1].1.bri, Some(10));
        assert!(controller.initial_group_state().any_on);
        assert_eq!(controller.initial_action().on, Some(true));
    }

    #[tokio::test]
    async fn test_new_unknown_room_fails() {
        let err = RoomController::new(FakeBridge::office(), "Garage")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::RoomNotFound(name)) if name == "Garage"
        ));
    }

    #[tokio::test]
    async fn test_new_ambiguous_room_fails() {
        let err = RoomController::new(FakeBridge::office(), "Hall")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AmbiguousRoom { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_room_name_match_is_exact() {
        assert!(RoomController::new(FakeBridge::office(), "office")
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_off_pauses_before_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let recorder = Arc::clone(&seen);
        let controller = RoomController::new(FakeBridge::office(), "Office")
            .await
            .unwrap()
            .with_post_send(move |light: &Light| {
                recorder
                    .lock()
                    .unwrap()
                    .push((light.id.clone(), light.state.on, start.elapsed()));
            });

        controller.switch(false).await.unwrap();

        let sent = controller.client().sent();
        assert_eq!(
            sent,
            vec![
                ("L1".to_string(), LightCommand::switch(false)),
                ("L2".to_string(), LightCommand::switch(false)),
            ]
        );

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(seen.len(), 2);
        for (expected_id, (light_id, on, elapsed)) in ["L1", "L2"].iter().zip(seen) {
            assert_eq!(light_id, *expected_id);
            assert!(!on);
            assert!(elapsed >= DEFAULT_COMMAND_DELAY);
        }
        // The pauses run side by side, not one after the other.
        assert!(start.elapsed() < DEFAULT_COMMAND_DELAY * 2);
    }

    #[tokio::test]
    async fn test_commands_chain() {
        let controller = office().await;
        controller
            .switch(true)
            .await
            .unwrap()
            .dim(80)
            .await
            .unwrap();
        let sent = controller.client().sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2].1, LightCommand::brightness(80));
    }

    #[tokio::test]
    async fn test_values_are_clamped() {
        let controller = office().await;
        controller.dim(999).await.unwrap();
        controller.set_hue(-1, 400).await.unwrap();
        controller.set_color(-3.0, 0.25).await.unwrap();
        controller.temp(370).await.unwrap();

        let sent: Vec<LightCommand> = controller
            .client()
            .sent()
            .into_iter()
            .filter(|(id, _)| id == "L1")
            .map(|(_, command)| command)
            .collect();
        assert_eq!(sent[0].bri, Some(255));
        assert_eq!(sent[1].hue, Some(65535));
        assert_eq!(sent[1].sat, Some(254));
        assert_eq!(sent[2].xy, Some([0.0, 0.25]));
        assert_eq!(sent[3].ct, Some(370));
    }

    #[tokio::test]
    async fn test_named_hue() {
        let controller = office().await;
        controller
            .set_named_hue(NamedHue::Blue, 254)
            .await
            .unwrap();
        assert_eq!(controller.get_hues().await.unwrap(), vec![45056, 45056]);
    }

    #[tokio::test]
    async fn test_get_hue_reads_live_state() {
        let controller = office().await;
        assert_eq!(controller.get_hue("L1").await.unwrap(), 1000);
        assert_eq!(controller.get_hues().await.unwrap(), vec![1000, 40000]);
        controller.set_hue_default(70000).await.unwrap();
        assert_eq!(controller.get_hue("L2").await.unwrap(), 4464);
    }

    #[tokio::test]
    async fn test_get_hue_of_white_light_fails() {
        let controller = RoomController::new(FakeBridge::office(), "Kitchen")
            .await
            .unwrap();
        let err = controller.get_hues().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoHue(id)) if id == "L3"));
    }

    #[tokio::test]
    async fn test_restore_reapplies_captured_states() {
        let controller = office().await;
        controller.switch(true).await.unwrap();
        controller.set_hue(12345, 10).await.unwrap();
        controller.set_color(0.1, 0.9).await.unwrap();
        controller.temp(500).await.unwrap();
        controller.dim(1).await.unwrap();
        controller.client().clear_sent();

        controller.restore().await.unwrap();

        let mut sent = controller.client().sent();
        sent.sort_by(|a, b| a.0.cmp(&b.0));
        let expected: Vec<(String, LightCommand)> = controller
            .initial_states()
            .iter()
            .map(|(id, state)| (id.clone(), LightCommand::from(state)))
            .collect();
        assert_eq!(sent, expected);

        let lights = controller.client().lights.lock().unwrap();
        for (light_id, state) in controller.initial_states() {
            assert_eq!(&lights[light_id], state);
        }
    }

    #[tokio::test]
    async fn test_restore_skips_fields_white_light_lacks() {
        let controller = RoomController::new(FakeBridge::office(), "Kitchen")
            .await
            .unwrap();
        controller.restore().await.unwrap();
        let sent = controller.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.hue, None);
        assert_eq!(sent[0].1.bri, Some(50));
    }

    #[tokio::test]
    async fn test_failing_light_fails_fan_out() {
        let bridge = FakeBridge {
            failing_light: Some("L2".to_string()),
            ..FakeBridge::office()
        };
        let controller = RoomController::new(bridge, "Office")
            .await
            .unwrap()
            .with_delay(Duration::ZERO);
        let err = controller.switch(false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Api { code: 201, .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_light_does_not_stop_the_others() {
        let bridge = FakeBridge {
            failing_light: Some("L1".to_string()),
            ..FakeBridge::office()
        };
        let controller = RoomController::new(bridge, "Office")
            .await
            .unwrap()
            .with_delay(Duration::ZERO);

        assert!(controller.switch(false).await.is_err());
        assert_eq!(
            controller.client().sent(),
            vec![("L2".to_string(), LightCommand::switch(false))]
        );

        controller.client().clear_sent();
        assert!(controller.restore().await.is_err());
        let l2 = controller.initial_states()[1].1.clone();
        assert_eq!(
            controller.client().sent(),
            vec![("L2".to_string(), LightCommand::from(&l2))]
        );
    }

    #[tokio::test]
    async fn test_missing_member_light_fails_construction() {
        let bridge = FakeBridge {
            groups: vec![group("9", "Attic", &["L1", "L404"])],
            ..FakeBridge::office()
        };
        assert!(RoomController::new(bridge, "Attic").await.is_err());
    }
}
