pub mod sensors {
    use crate::cache::CacheHandle;
    use crate::sensor::{descriptors_for, DeviceCapability, SensorDescriptor};
    use std::io::Write as _;
    use std::path::PathBuf;

    #[derive(clap::ValueEnum, Clone, Debug)]
    pub enum Format {
        Table,
        Json,
        Csv,
    }

    /// Output the sensors this tool exposes for a device family.
    ///
    /// Works offline; nothing is fetched from a device.
    #[derive(clap::Parser)]
    pub struct Args {
        #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
        format: Format,
        /// The device family to list the sensors for.
        #[arg(long, value_enum, default_value_t = DeviceCapability::Battery)]
        capability: DeviceCapability,
        #[arg(long, short = 'o')]
        file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not open the specified output file at {1:?}")]
        OpenOutputFile(#[source] std::io::Error, PathBuf),
        #[error("could not write data to the output file at {1:?}")]
        WriteFile(#[source] std::io::Error, PathBuf),
        #[error("could not write data to the terminal")]
        WriteStdout(#[source] std::io::Error),
        #[error("could not serialize sensors to JSON")]
        SerializeJson(#[source] serde_json::Error),
        #[error("could not serialize sensors to CSV")]
        SerializeCsv(#[source] csv::Error),
    }

    #[derive(serde::Serialize)]
    struct SensorSchema<'a> {
        name: &'a str,
        source: &'static str,
        path: &'a str,
        device_class: Option<&'static str>,
        state_class: Option<&'static str>,
        unit: Option<&'static str>,
        precision: Option<u8>,
        entity_category: Option<&'static str>,
        translation_key: Option<&'static str>,
        options: Option<&'a [&'static str]>,
    }

    impl<'a> SensorSchema<'a> {
        fn new(sensor: &'a SensorDescriptor) -> Self {
            Self {
                name: sensor.name(),
                source: sensor.command().into(),
                path: sensor.path(),
                device_class: sensor.device_class().map(Into::into),
                state_class: sensor.state_class().map(Into::into),
                unit: sensor.unit(),
                precision: sensor.precision(),
                entity_category: sensor.entity_category().map(Into::into),
                translation_key: sensor.translation_key(),
                options: sensor.options(),
            }
        }

        fn row(&self) -> Vec<String> {
            vec![
                self.name.to_string(),
                self.source.to_string(),
                self.path.to_string(),
                self.device_class.unwrap_or_default().to_string(),
                self.state_class.unwrap_or_default().to_string(),
                self.unit.unwrap_or_default().to_string(),
                self.precision.map(|p| p.to_string()).unwrap_or_default(),
                self.entity_category.unwrap_or_default().to_string(),
                self.options.map(|options| options.join("|")).unwrap_or_default(),
            ]
        }
    }

    const HEADER: [&str; 9] = [
        "Name",
        "Source",
        "Path",
        "Class",
        "State class",
        "Unit",
        "Precision",
        "Category",
        "Options",
    ];

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output_writer: Box<dyn std::io::Write> = match &args.file {
            None => Box::new(std::io::stdout().lock()) as Box<_>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };

        let sensors = descriptors_for(args.capability, CacheHandle::detached());
        let data = match args.format {
            Format::Table => {
                let mut table = comfy_table::Table::new();
                table
                    .set_header(HEADER.to_vec())
                    .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                for sensor in &sensors {
                    table.add_row(SensorSchema::new(sensor).row());
                }
                table.to_string().into_bytes()
            }
            Format::Json => {
                let records = sensors.iter().map(SensorSchema::new).collect::<Vec<_>>();
                serde_json::to_vec(&records).map_err(Error::SerializeJson)?
            }
            Format::Csv => {
                let mut bytes = Vec::new();
                let mut writer = csv::Writer::from_writer(&mut bytes);
                writer.write_record(HEADER).map_err(Error::SerializeCsv)?;
                for sensor in &sensors {
                    writer
                        .write_record(SensorSchema::new(sensor).row())
                        .map_err(Error::SerializeCsv)?;
                }
                drop(writer);
                bytes
            }
        };
        output_writer.write_all(&data).map_err(|e| match args.file {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p),
        })?;
        Ok(())
    }
}

pub mod status {
    use crate::api;
    use crate::cache::PayloadCache;
    use crate::sensor::{assemble, DeviceClass, SensorDescriptor, StateValue};
    use std::io::Write as _;
    use std::path::PathBuf;

    #[derive(clap::ValueEnum, Clone, Debug)]
    pub enum Format {
        Table,
        Json,
    }

    /// Connect to a device, fetch its status payloads once and print every
    /// sensor's current reading.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        api: api::Args,
        #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
        format: Format,
        #[arg(long, short = 'o')]
        file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not construct the device API client")]
        Client(#[source] api::Error),
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not open the specified output file at {1:?}")]
        OpenOutputFile(#[source] std::io::Error, PathBuf),
        #[error("could not write data to the output file at {1:?}")]
        WriteFile(#[source] std::io::Error, PathBuf),
        #[error("could not write data to the terminal")]
        WriteStdout(#[source] std::io::Error),
        #[error("could not serialize sensor states to JSON")]
        SerializeJson(#[source] serde_json::Error),
    }

    #[derive(serde::Serialize)]
    struct StatusRecord<'a> {
        name: &'a str,
        available: bool,
        value: Option<StateValue>,
        unit: Option<&'static str>,
        precision: Option<u8>,
        device_class: Option<DeviceClass>,
        options: Option<&'a [&'static str]>,
        data_age: Option<String>,
    }

    impl<'a> StatusRecord<'a> {
        fn new(sensor: &'a SensorDescriptor) -> Self {
            let state = sensor.refresh();
            let data_age = sensor
                .data_fetched_at()
                .map(|fetched_at| format!("{:#}", jiff::Timestamp::now() - fetched_at));
            Self {
                name: sensor.name(),
                available: state.available,
                value: state.value,
                unit: sensor.unit(),
                precision: sensor.precision(),
                device_class: sensor.device_class(),
                options: sensor.options(),
                data_age,
            }
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        // The cache stays alive until the readings are rendered below.
        let (sensors, _cache) = runtime.block_on(async {
            let client = args.api.to_client().map_err(Error::Client)?;
            let capability = client.detect_capability().await;
            tracing::info!(?capability, "device classified");
            let cache = PayloadCache::new(client);
            let sensors = assemble(capability, &cache).await;
            Ok::<_, Error>((sensors, cache))
        })?;

        let mut output_writer: Box<dyn std::io::Write> = match &args.file {
            None => Box::new(std::io::stdout().lock()) as Box<_>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };

        let data = match args.format {
            Format::Table => {
                let mut table = comfy_table::Table::new();
                table
                    .set_header(vec!["Name", "Value", "Unit", "Available", "Data age"])
                    .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                for sensor in &sensors {
                    let record = StatusRecord::new(sensor);
                    table.add_row(vec![
                        record.name.to_string(),
                        record
                            .value
                            .as_ref()
                            .map(|value| value.display(record.precision))
                            .unwrap_or_default(),
                        record.unit.unwrap_or_default().to_string(),
                        record.available.to_string(),
                        record.data_age.clone().unwrap_or_default(),
                    ]);
                }
                table.to_string().into_bytes()
            }
            Format::Json => {
                let records = sensors.iter().map(StatusRecord::new).collect::<Vec<_>>();
                serde_json::to_vec(&records).map_err(Error::SerializeJson)?
            }
        };
        output_writer.write_all(&data).map_err(|e| match args.file {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p),
        })?;
        Ok(())
    }
}

pub mod monitor {
    use crate::api;
    use crate::cache::PayloadCache;
    use crate::mqtt::Bridge;
    use crate::sensor::assemble;

    /// Bridge a device into the home-automation hub over MQTT.
    ///
    /// Announces every sensor through MQTT discovery once, then keeps
    /// publishing availability and state on a fixed cadence.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        api: api::Args,

        /// Hostname of the MQTT broker the hub listens on.
        #[arg(long)]
        mqtt_host: String,

        /// Port of the MQTT broker.
        #[arg(long, default_value = "1883")]
        mqtt_port: u16,

        #[arg(long)]
        mqtt_username: Option<String>,

        #[arg(long)]
        mqtt_password: Option<String>,

        /// MQTT client identifier.
        #[arg(long, default_value = "sessy-tools")]
        client_id: String,

        /// Topic prefix the hub watches for discovery configs.
        #[arg(long, default_value = "homeassistant")]
        discovery_prefix: String,

        /// Identifier used in state topics and unique ids. Keep it distinct
        /// per physical device.
        #[arg(long, default_value = "sessy")]
        device_id: String,

        /// How often sensor states are published to the hub.
        #[arg(long, default_value = "5s")]
        publish_interval: humantime::Duration,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not construct the device API client")]
        Client(#[source] api::Error),
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not register the sensors with the hub")]
        Announce(#[source] crate::mqtt::Error),
        #[error("could not publish sensor states to the hub")]
        Publish(#[source] crate::mqtt::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        runtime.block_on(run_bridge(args))
    }

    async fn run_bridge(args: Args) -> Result<(), Error> {
        let client = args.api.to_client().map_err(Error::Client)?;
        let capability = client.detect_capability().await;
        tracing::info!(?capability, "device classified");
        let cache = PayloadCache::new(client);
        let sensors = assemble(capability, &cache).await;

        let mut options =
            rumqttc::v5::MqttOptions::new(args.client_id, args.mqtt_host, args.mqtt_port);
        if let (Some(user), Some(password)) = (args.mqtt_username, args.mqtt_password) {
            options.set_credentials(user, password);
        }
        let (mqtt, mut eventloop) = rumqttc::v5::AsyncClient::new(options, 64);
        let bridge = Bridge::new(mqtt, args.discovery_prefix, args.device_id);
        bridge.announce(&sensors).await.map_err(Error::Announce)?;

        let mut timer = tokio::time::interval(*args.publish_interval);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    bridge.publish_states(&sensors).await.map_err(Error::Publish)?;
                }
                event = eventloop.poll() => match event {
                    Ok(event) => tracing::trace!(?event, "mqtt event"),
                    Err(error) => {
                        tracing::warn!(
                            error = &error as &dyn std::error::Error,
                            "mqtt connection error"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                },
            }
        }
    }
}
