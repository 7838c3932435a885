//! DTI 质量控制与后处理命令行工具.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dti_berry::consts::{files, B0_THRESHOLD, RMS_RADIUS_MM};
use dti_berry::glm::{factorial_designs, RandomiseOptions, RandomiseSetup, Table};
use dti_berry::matrix::{self, Threshold, WEIGHT_BINS, WEIGHT_RANGE};
use dti_berry::motion::{write_motion_outputs, DispSeries, RegistrationLog, VolumeGroup};
use dti_berry::plot::parse_color;
use dti_berry::qc::{cohort_report, CohortOptions, Column};
use dti_berry::tracking::{condition_seeds, seed_region, seeds_from_mask, ConnectivityJob, SEED_FUDGE, SEED_TOLERANCE};
use dti_berry::{dataset, report, text, DtiVolume, NiftiHeaderAttr};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dti-tools", version, about = "DTI 预处理结果的质量控制与后处理")]
struct Cli {
    /// 输出更多日志 (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 由 .ecclog 计算位移, 旋转和平移, 并画图.
    Motion {
        /// eddy_correct 生成的 .ecclog 文件.
        ecclog: PathBuf,

        /// 输出目录, 默认为 ecclog 所在目录.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// 参考体积; 以其质心作为 rms 计算的球心. 默认为原点.
        #[arg(long)]
        reference: Option<PathBuf>,

        /// rms 计算的球半径 (mm).
        #[arg(long, default_value_t = RMS_RADIUS_MM)]
        radius: f64,
    },

    /// 按 b 值将 ec_disp.txt 拆分为 b0 与非 b0 两个文件.
    SplitDisp {
        /// 包含 ec_disp.txt 与 bvals 的目录.
        dir: PathBuf,

        #[arg(long, default_value_t = B0_THRESHOLD)]
        b0_threshold: f64,
    },

    /// 生成单被试 QA 报告.
    Report {
        /// 被试的 DTI 目录.
        dir: PathBuf,

        #[arg(long, default_value_t = report::DEFAULT_DPI)]
        dpi: f64,
    },

    /// 队列头动汇总, 离群点箱线图与头动热图.
    Cohort(CohortArgs),

    /// 在分区图, 脑掩膜与白质掩膜的交集中撒种子点.
    Seeds {
        #[arg(long)]
        parcellation: PathBuf,

        /// 脑掩膜, 一般为 `dti_ec_brain_mask.nii.gz`.
        #[arg(long)]
        brain_mask: PathBuf,

        #[arg(long)]
        wm_mask: PathBuf,

        /// 输出文件, 每行一个世界坐标种子点.
        #[arg(short, long)]
        out: PathBuf,

        /// 每个体素每个方向的种子点数.
        #[arg(long, default_value_t = 1)]
        density: usize,

        #[arg(long, default_value_t = SEED_TOLERANCE)]
        tol: f64,

        #[arg(long, default_value_t = SEED_FUDGE)]
        fudge: f64,
    },

    /// 由纤维端点计算连接矩阵.
    Connectivity {
        /// 预处理目录.
        dti_dir: PathBuf,

        #[arg(long)]
        parcellation: PathBuf,

        #[arg(long)]
        wm_mask: PathBuf,

        /// 纤维文件.
        #[arg(long)]
        streamlines: Option<PathBuf>,

        /// 纤维坐标为世界坐标.
        #[arg(long)]
        world: bool,
    },

    /// 按 cost 或保留边数阈值化连接矩阵.
    Threshold {
        matrix: PathBuf,

        #[arg(long, conflicts_with = "n_keep")]
        cost: Option<f64>,

        #[arg(long)]
        n_keep: Option<usize>,

        /// 随机数种子, 用于并列值的取舍.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// 求一组连接矩阵的平均.
    Average {
        /// 每行一个矩阵路径的列表文件.
        list: PathBuf,

        /// 输出文本文件.
        out: PathBuf,
    },

    /// 连接权重直方图.
    Weights {
        matrix: PathBuf,

        #[arg(long, default_value_t = WEIGHT_RANGE.0)]
        min: f64,

        #[arg(long, default_value_t = WEIGHT_RANGE.1)]
        max: f64,

        #[arg(long, default_value_t = WEIGHT_BINS)]
        bins: usize,

        /// 颜色, `#rrggbb` 或常见颜色名.
        #[arg(long, default_value = "blue")]
        color: String,

        /// 画出 cost 标注框.
        #[arg(long)]
        cost_box: bool,
    },

    /// Msym.txt 的纤维条数直方图.
    Ntracts { msym: PathBuf },

    /// 由被试编号生成 LL/SS × CA 析因设计.
    Factorial {
        sublist: PathBuf,

        out_dir: PathBuf,
    },

    /// 按 TOML 选项批量生成 randomise 设计.
    Randomise(RandomiseArgs),
}

#[derive(Args, Debug)]
struct CohortArgs {
    /// 数据根目录, 默认取 `$DTI_DATA_DIR` 或 `$HOME/dataset/dti`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 被试列表, 默认为数据根目录下的 `sublist`.
    #[arg(long)]
    sublist: Option<PathBuf>,

    /// 输出目录.
    #[arg(short, long)]
    out: PathBuf,

    /// 排序列.
    #[arg(long, default_value = "mean_rms_rel_notb0")]
    sort_by: String,

    /// 画箱线图前剔除 mean_rms_abs 不小于该值的被试.
    #[arg(long)]
    max_value: Option<f64>,

    #[arg(long, default_value_t = B0_THRESHOLD)]
    b0_threshold: f64,
}

#[derive(Args, Debug)]
struct RandomiseArgs {
    /// 行为数据 (CSV).
    behav: PathBuf,

    /// TOML 选项文件.
    #[arg(long)]
    options: PathBuf,

    /// 有可用 MRI 数据的被试列表.
    #[arg(long)]
    usable: PathBuf,

    /// 输出目录, 设计写入其 GLM 子目录.
    #[arg(short, long)]
    out: PathBuf,

    /// 以 SubID 左连接的附加数据 (如皮质醇, TSV).
    #[arg(long)]
    merge: Option<PathBuf>,

    /// 附加数据的可用标记列.
    #[arg(long, default_value = "UsableCort")]
    merge_flag: String,
}

fn motion(ecclog: &Path, out: Option<PathBuf>, reference: Option<PathBuf>, radius: f64) -> Result<()> {
    let log = RegistrationLog::read(ecclog).with_context(|| format!("reading {}", ecclog.display()))?;
    let centre = match reference {
        Some(r) => DtiVolume::open(&r)?
            .centre_of_mass()
            .ok_or_else(|| anyhow!("{} is empty", r.display()))?,
        None => [0.0; 3],
    };
    let params = log.motion(centre, radius)?;
    let out = match out {
        Some(o) => o,
        None => ecclog.parent().map(Path::to_owned).unwrap_or_default(),
    };
    fs::create_dir_all(&out)?;
    for p in write_motion_outputs(&out, &params)? {
        println!("{}", p.display());
    }
    Ok(())
}

fn split_disp(dir: &Path, b0_threshold: f64) -> Result<()> {
    let disp = DispSeries::read(dir.join(files::EC_DISP))?;
    let bvals = text::load_vector(dir.join(files::BVALS))?;
    let (b0, notb0) = disp.split(&bvals, b0_threshold)?;
    b0.write(dir.join(VolumeGroup::B0.disp_file()))?;
    notb0.write(dir.join(VolumeGroup::NotB0.disp_file()))?;
    Ok(())
}

fn cohort(args: CohortArgs) -> Result<()> {
    let data_dir = utils::data_dir_from_env_or_home(args.data_dir).context("no data directory")?;
    let sublist = args.sublist.unwrap_or_else(|| data_dir.join(dataset::SUBLIST));
    let subs = dataset::read_sublist(&sublist).with_context(|| format!("reading {}", sublist.display()))?;
    let opts = CohortOptions {
        sort_by: args.sort_by.parse::<Column>()?,
        max_value: args.max_value,
        b0_threshold: args.b0_threshold,
    };
    for p in cohort_report(&data_dir, &subs, &args.out, &opts)? {
        println!("{}", p.display());
    }
    Ok(())
}

fn seeds(
    parcellation: &Path,
    brain_mask: &Path,
    wm_mask: &Path,
    out: &Path,
    density: usize,
    tol: f64,
    fudge: f64,
) -> Result<()> {
    let parc = DtiVolume::open(parcellation)?;
    let brain = DtiVolume::open(brain_mask)?;
    let wm = DtiVolume::open(wm_mask)?;
    let mask = seed_region(&parc, &brain, &wm)?;
    let affine = parc.affine();
    let world: Vec<[f64; 3]> = seeds_from_mask(mask.data(), density)?
        .into_iter()
        .map(|s| affine.apply(s))
        .collect();
    let cond = condition_seeds(&world, &affine, parc.shape(), tol, fudge)?;

    let body: String = cond
        .seeds
        .iter()
        .map(|[x, y, z]| format!("{x:.6} {y:.6} {z:.6}\n"))
        .collect();
    fs::write(out, body).with_context(|| format!("writing {}", out.display()))?;
    println!(
        "{} seeds ({} nudged, {} removed) -> {}",
        cond.seeds.len(),
        cond.nudged,
        cond.removed,
        out.display()
    );
    Ok(())
}

fn randomise(args: RandomiseArgs) -> Result<()> {
    let mut table = Table::read(&args.behav)?;
    table.derive_columns()?;
    if let Some(m) = &args.merge {
        let mut other = Table::read(m)?;
        other.derive_columns()?;
        table.merge_left(&other, "SubID", Some(args.merge_flag.as_str()))?;
    }
    let usable = text::read_lines(&args.usable)?;
    let options = RandomiseOptions::read(&args.options)?;
    let setup = RandomiseSetup::new(table, usable, options)?;
    for d in setup.run(&args.out)? {
        println!("{}", d.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logger(cli.verbose);
    log::debug!("running on {} cpus", utils::cpus());

    match cli.command {
        Command::Motion {
            ecclog,
            out,
            reference,
            radius,
        } => motion(&ecclog, out, reference, radius)?,
        Command::SplitDisp { dir, b0_threshold } => split_disp(&dir, b0_threshold)?,
        Command::Report { dir, dpi } => println!("{}", report::qa_report(&dir, dpi)?.display()),
        Command::Cohort(args) => cohort(args)?,
        Command::Seeds {
            parcellation,
            brain_mask,
            wm_mask,
            out,
            density,
            tol,
            fudge,
        } => seeds(&parcellation, &brain_mask, &wm_mask, &out, density, tol, fudge)?,
        Command::Connectivity {
            dti_dir,
            parcellation,
            wm_mask,
            streamlines,
            world,
        } => {
            let job = ConnectivityJob {
                dti_dir,
                parcellation,
                wm_mask,
                streamlines,
                world_coords: world,
            };
            for p in job.run()? {
                println!("{}", p.display());
            }
        }
        Command::Threshold {
            matrix: path,
            cost,
            n_keep,
            seed,
        } => {
            let threshold = match (cost, n_keep) {
                (Some(c), None) => Threshold::Cost(c),
                (None, Some(k)) => Threshold::NKeep(k),
                _ => bail!("exactly one of --cost and --n-keep is required"),
            };
            let mut rng = StdRng::seed_from_u64(seed);
            let (txt, png) = matrix::threshold_file(&path, threshold, &mut rng)?;
            println!("{}\n{}", txt.display(), png.display());
        }
        Command::Average { list, out } => {
            let (txt, png) = matrix::average_files(&list, &out)?;
            println!("{}\n{}", txt.display(), png.display());
        }
        Command::Weights {
            matrix: path,
            min,
            max,
            bins,
            color,
            cost_box,
        } => {
            let color = parse_color(&color).ok_or_else(|| anyhow!("unknown color `{color}`"))?;
            println!("{}", matrix::weights_file(&path, (min, max), bins, color, cost_box)?.display());
        }
        Command::Ntracts { msym } => println!("{}", matrix::ntracts_file(&msym)?.display()),
        Command::Factorial { sublist, out_dir } => {
            let subs = dataset::read_sublist(&sublist)?;
            for p in factorial_designs(&subs, &out_dir)? {
                println!("{}", p.display());
            }
        }
        Command::Randomise(args) => randomise(args)?,
    }
    utils::sep();
    Ok(())
}
